//! WebSocket Transport Layer
//!
//! Single responsibility: open a WebSocket and classify what comes off it.
//! No knowledge of queries, events or credentials.

use futures_util::{
    stream::{SplitSink, SplitStream},
    StreamExt,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{http::StatusCode, protocol::Message, Error as WsError},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::error::ClientError;

/// Type alias for the WebSocket send half
pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Type alias for the WebSocket receive half
pub type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// A connected WebSocket transport.
///
/// It can only be constructed via `Transport::connect()`.
pub struct Transport {
    sink: WsSink,
    stream: WsStream,
}

impl Transport {
    /// Connect to a signed endpoint.
    ///
    /// Returns a Transport only once the handshake has completed.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        debug!(host = %redact_query(url), "Connecting to WebSocket");

        let (ws, _) = connect_async(url).await.map_err(classify_connect_error)?;
        let (sink, stream) = ws.split();

        debug!(host = %redact_query(url), "WebSocket connected");
        Ok(Self { sink, stream })
    }

    /// Split into separate sink and stream for concurrent send/receive.
    pub fn split(self) -> (WsSink, WsStream) {
        (self.sink, self.stream)
    }
}

/// What one WebSocket message means to the receive loop.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Frame(Vec<u8>),
    Closed,
    /// Ping / pong / raw frames. Pong is handled automatically by tungstenite.
    Skip,
}

impl From<Message> for Inbound {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Inbound::Frame(text.into_bytes()),
            Message::Binary(data) => Inbound::Frame(data),
            Message::Close(_) => Inbound::Closed,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Skip,
        }
    }
}

/// A rejected handshake means the signature is no longer accepted; anything
/// else is an ordinary transport failure.
fn classify_connect_error(err: WsError) -> ClientError {
    match err {
        WsError::Http(response)
            if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
        {
            ClientError::CredentialExpired(format!(
                "Endpoint rejected handshake with {}",
                response.status()
            ))
        }
        other => ClientError::Transport(format!("WebSocket connect failed: {}", other)),
    }
}

/// Strip the signature query string before a URL goes into a log line.
pub(crate) fn redact_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

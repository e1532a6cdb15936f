//! Connection Manager
//!
//! Single responsibility: keep at most one socket open and run its receive
//! task. Request state lives in the dispatcher; this layer only moves frames.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use super::transport::{redact_query, Inbound, Transport, WsSink, WsStream};
use super::{ConnectionConfig, ConnectionState};
use crate::credentials::CredentialSupplier;
use crate::dispatch::SharedDispatcher;
use crate::error::{ClientError, Result};
use crate::protocol::{decode, Event, EventKind, QueryPayload};

/// The open half of a connection: where payloads go, and the task reading
/// the other half.
struct Link {
    sink: WsSink,
    recv_task: JoinHandle<()>,
}

/// Most recent send or receive, as unix millis. 0 until the first one.
#[derive(Debug, Default)]
struct Activity(AtomicI64);

impl Activity {
    fn touch(&self) {
        self.0.fetch_max(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn last(&self) -> Option<DateTime<Utc>> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }
}

/// Owns one WebSocket to the gateway.
///
/// # Guarantees
///
/// - `connect()` resolves only once the socket is open, and concurrent
///   callers serialize: the second one finds the socket open and returns.
/// - `send()` never waits for a connection; it fails with `NotConnected`
///   outside `Open`.
/// - `close()` always ends in `Disconnected`, within `close_timeout`.
pub struct ConnectionManager {
    config: ConnectionConfig,
    supplier: Arc<dyn CredentialSupplier>,
    dispatcher: SharedDispatcher,
    state: Arc<watch::Sender<ConnectionState>>,
    activity: Arc<Activity>,
    link: Mutex<Option<Link>>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        supplier: Arc<dyn CredentialSupplier>,
        dispatcher: SharedDispatcher,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            supplier,
            dispatcher,
            state: Arc::new(state),
            activity: Arc::new(Activity::default()),
            link: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Time of the most recent frame sent or received, if any.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.activity.last()
    }

    pub fn dispatcher(&self) -> &SharedDispatcher {
        &self.dispatcher
    }

    /// Open the socket.
    ///
    /// Obtains a fresh credential, performs the handshake and starts the
    /// receive task, all bounded by `connect_timeout`. Returns immediately if
    /// the socket is already open.
    ///
    /// # Errors
    /// - `CredentialExpired` if the supplier hands out a stale endpoint or
    ///   the gateway rejects the signature
    /// - `Transport` if the handshake fails
    /// - `Timeout` if the whole attempt outlives `connect_timeout`
    /// - whatever the credential supplier returns
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        if self.is_open() {
            return Ok(());
        }

        // A receive task that already ended on its own.
        if let Some(stale) = link.take() {
            stale.recv_task.abort();
            let _ = stale.recv_task.await;
        }

        self.state.send_replace(ConnectionState::Connecting);

        let result = match tokio::time::timeout(self.config.connect_timeout, self.open()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(format!(
                "Connect did not complete within {:?}",
                self.config.connect_timeout
            ))),
        };

        match result {
            Ok(opened) => {
                *link = Some(opened);
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(ConnectionState::Disconnected);
                warn!(error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<Link> {
        let credential = self.supplier.obtain().await?;
        if credential.is_expired_at(Utc::now()) {
            return Err(ClientError::CredentialExpired(format!(
                "Signed endpoint for {} is past its validity window",
                credential.principal_id
            )));
        }

        let transport = Transport::connect(&credential.signed_endpoint).await?;
        let (sink, stream) = transport.split();

        // Open before the receive task exists, so its final transition to
        // Disconnected cannot be overwritten.
        self.state.send_replace(ConnectionState::Open);
        self.activity.touch();

        info!(
            principal = %credential.principal_id,
            endpoint = %redact_query(&credential.signed_endpoint),
            "Gateway connection open"
        );
        self.dispatcher.dispatch(&lifecycle_event(
            EventKind::SocketOpen,
            json!({ "principalId": credential.principal_id }),
        ));

        let recv_task = tokio::spawn(receive_loop(
            stream,
            self.dispatcher.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.activity),
        ));

        Ok(Link { sink, recv_task })
    }

    /// Send one query payload as a text frame.
    ///
    /// Suspends until the transport has accepted or rejected the frame.
    pub async fn send(&self, payload: &QueryPayload) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(ClientError::NotConnected { state });
        }

        let text = serde_json::to_string(payload)?;

        let mut link = self.link.lock().await;
        let state = self.state();
        let current = match link.as_mut() {
            Some(current) if state == ConnectionState::Open => current,
            _ => return Err(ClientError::NotConnected { state }),
        };

        current
            .sink
            .send(Message::Text(text))
            .await
            .map_err(|e| ClientError::Transport(format!("Failed to send: {}", e)))?;
        self.activity.touch();

        debug!(request_id = %payload.request_id, "Payload sent");
        Ok(())
    }

    /// Close the socket.
    ///
    /// Sends a close frame and waits for the receive task to observe the
    /// closure. If that takes longer than `close_timeout` the task is aborted
    /// and the state forced to `Disconnected`. In-flight requests stay
    /// registered.
    pub async fn close(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        let Some(mut current) = link.take() else {
            self.state.send_replace(ConnectionState::Disconnected);
            return Ok(());
        };

        if current.recv_task.is_finished() {
            self.state.send_replace(ConnectionState::Disconnected);
            return Ok(());
        }

        self.state.send_replace(ConnectionState::Closing);
        info!("Closing gateway connection");

        if let Err(e) = current.sink.send(Message::Close(None)).await {
            debug!(error = %e, "Close frame not sent");
        }

        if tokio::time::timeout(self.config.close_timeout, &mut current.recv_task)
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.config.close_timeout,
                "Gateway did not confirm close, aborting receive task"
            );
            current.recv_task.abort();
            self.state.send_replace(ConnectionState::Disconnected);
            self.dispatcher
                .dispatch(&lifecycle_event(EventKind::SocketClosed, json!({ "forced": true })));
        }

        Ok(())
    }

    /// Close, then connect with a freshly obtained credential.
    pub async fn reconnect(&self) -> Result<()> {
        info!("Reconnecting with a fresh credential");
        self.close().await?;
        self.connect().await
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.recv_task.abort();
            debug!("Connection manager dropped, receive task aborted");
        }
    }
}

/// Events the connection synthesizes for itself. They carry no request id.
fn lifecycle_event(kind: EventKind, mut payload: Value) -> Event {
    if let Value::Object(fields) = &mut payload {
        fields.insert("messageType".into(), Value::String(kind.as_str().to_string()));
    }
    Event::new(kind, None, payload)
}

/// Receive loop - runs in a spawned task.
///
/// Decodes every frame and dispatches it in arrival order. Ends on a close
/// frame, a transport error or the end of the stream, then marks the
/// connection `Disconnected`.
async fn receive_loop(
    mut stream: WsStream,
    dispatcher: SharedDispatcher,
    state: Arc<watch::Sender<ConnectionState>>,
    activity: Arc<Activity>,
) {
    debug!("Receive loop started");

    while let Some(msg) = stream.next().await {
        match msg.map(Inbound::from) {
            Ok(Inbound::Frame(data)) => {
                activity.touch();
                if data.iter().all(u8::is_ascii_whitespace) {
                    info!("Skipping empty frame");
                    continue;
                }
                dispatcher.dispatch(&decode(&data));
            }
            Ok(Inbound::Closed) => {
                info!("Gateway closed connection");
                break;
            }
            Ok(Inbound::Skip) => {}
            Err(e) => {
                error!(error = %e, "WebSocket error");
                dispatcher.dispatch(&lifecycle_event(
                    EventKind::LogError,
                    json!({
                        "logLevel": "ERROR",
                        "error": format!("Transport error: {}", e),
                    }),
                ));
                break;
            }
        }
    }

    debug!("Receive loop ended");

    state.send_replace(ConnectionState::Disconnected);
    dispatcher.dispatch(&lifecycle_event(EventKind::SocketClosed, json!({})));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credential, StaticCredentialSupplier};
    use crate::dispatch::{Callbacks, Dispatcher};
    use crate::protocol::{EngineType, MessageType};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Blocks in `obtain()` until released, then points at a closed port.
    struct GatedSupplier {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl CredentialSupplier for GatedSupplier {
        async fn obtain(&self) -> Result<Credential> {
            self.release.notified().await;
            Ok(Credential {
                principal_id: "alice".into(),
                signed_endpoint: "ws://127.0.0.1:1".into(),
                expires_at: None,
                id_token: None,
            })
        }
    }

    fn payload() -> QueryPayload {
        QueryPayload {
            message_type: MessageType::SqlQuery,
            request_id: "r1".into(),
            sql: "SELECT 1".into(),
            scan_cursor: 0,
            engine: EngineType::Duckdb,
            split_access: false,
            split_size_mb: 500,
            js_hooks: None,
            cross_region_policy: None,
            allowed_regions: None,
            read_cache: None,
            write_cache: None,
            outputs: None,
            tags: None,
        }
    }

    fn manager(supplier: Arc<dyn CredentialSupplier>) -> ConnectionManager {
        ConnectionManager::new(
            ConnectionConfig {
                connect_timeout: Duration::from_secs(5),
                close_timeout: Duration::from_millis(200),
            },
            supplier,
            SharedDispatcher::new(Dispatcher::new(Callbacks::new())),
        )
    }

    #[tokio::test]
    async fn test_send_before_connect_is_not_connected() {
        let manager = manager(Arc::new(StaticCredentialSupplier::new("alice", "ws://127.0.0.1:1")));
        let err = manager.send(&payload()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::NotConnected {
                state: ConnectionState::Disconnected
            }
        ));
        assert!(manager.last_activity().is_none());
    }

    #[tokio::test]
    async fn test_send_while_connecting_is_not_connected() {
        let release = Arc::new(Notify::new());
        let manager = Arc::new(manager(Arc::new(GatedSupplier {
            release: Arc::clone(&release),
        })));

        let mut states = manager.watch_state();
        let connecting = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.connect().await }
        });
        states
            .wait_for(|s| *s == ConnectionState::Connecting)
            .await
            .unwrap();

        let err = manager.send(&payload()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::NotConnected {
                state: ConnectionState::Connecting
            }
        ));

        release.notify_one();
        let result = connecting.await.unwrap();
        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_expired_credential_is_fatal() {
        let supplier = StaticCredentialSupplier::new("alice", "ws://127.0.0.1:1")
            .with_expiry(Utc::now() - ChronoDuration::minutes(1));
        let manager = manager(Arc::new(supplier));

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::CredentialExpired(_)));
        assert!(err.is_fatal());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let manager = manager(Arc::new(StaticCredentialSupplier::new("alice", "ws://127.0.0.1:1")));
        manager.close().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_lifecycle_event_carries_message_type() {
        let event = lifecycle_event(EventKind::SocketClosed, json!({}));
        assert_eq!(event.payload["messageType"], "SOCKET_CLOSED");
        assert!(event.request_id.is_none());
    }
}

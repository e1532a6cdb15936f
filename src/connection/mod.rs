//! Gateway Connection
//!
//! One WebSocket to the query gateway, opened with a short-lived signed
//! endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  ConnectionManager                      │
//! │  - connect() / send() / close() / reconnect()           │
//! │  - Disconnected → Connecting → Open → Closing           │
//! │  - Owns the receive task for the open socket            │
//! └────────────────────────────────────────────────────────┘
//!               │                         │
//!               ▼                         ▼
//!      CredentialSupplier             Transport
//!      (signed endpoint)          (tokio-tungstenite)
//! ```
//!
//! # Receive Task
//!
//! Exactly one task per open socket. Every frame is decoded and dispatched
//! on that task, in arrival order, so handlers see one request's events
//! sequentially. The task dispatches `SOCKET_CLOSED` when the stream ends.
//!
//! # Reconnection Policy
//!
//! Nothing reconnects in the background. A dead socket is reopened by the
//! next `connect()` (the query session does this on demand), and a stale
//! signed endpoint is replaced through `reconnect()`, which always obtains a
//! fresh credential.

mod manager;
mod transport;

use std::fmt;
use std::time::Duration;

use crate::config::ClientConfig;

pub use manager::ConnectionManager;
pub use transport::{Transport, WsSink, WsStream};

/// Lifecycle of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timeouts for the connection lifecycle.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upper bound on credential + handshake
    pub connect_timeout: Duration,
    /// How long `close()` waits for the receive task to see the close
    pub close_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ClientConfig> for ConnectionConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            close_timeout: config.close_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_from_client_config() {
        let client = ClientConfig {
            connect_timeout_secs: 7,
            close_timeout_secs: 1,
            ..Default::default()
        };
        let config = ConnectionConfig::from(&client);
        assert_eq!(config.connect_timeout, Duration::from_secs(7));
        assert_eq!(config.close_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}

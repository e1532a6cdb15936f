//! Error types for boilingdata-client

use thiserror::Error;

use crate::connection::ConnectionState;
use crate::hooks::HookSlot;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Identity check rejected the principal. Fatal to `connect()`.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Caller misuse or an unusable configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The signed endpoint is past its validity window. A fresh credential is
    /// required; retrying the same endpoint will not help.
    #[error("Credential expired: {0}")]
    CredentialExpired(String),

    #[error("Not connected (connection is {state})")]
    NotConnected { state: ConnectionState },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid {hook} hook: {reason}")]
    HookValidation { hook: HookSlot, reason: String },

    /// Error reported by the remote engine for a single request.
    #[error("Remote query error: {0}")]
    RemoteQuery(serde_json::Value),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the error concerns the connection as a whole rather than a
    /// single request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Authentication(_)
                | ClientError::Configuration(_)
                | ClientError::CredentialExpired(_)
                | ClientError::Transport(_)
        )
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::Configuration(err.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(err: toml::ser::Error) -> Self {
        ClientError::Configuration(err.to_string())
    }
}

//! Configuration for boilingdata-client

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::credentials::Region;
use crate::error::Result;
use crate::protocol::EngineType;

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boilingdata")
        .join("config.toml")
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Gateway region
    #[serde(default)]
    pub region: Region,

    /// Gateway URL overriding the regional default
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Principal to authenticate as
    #[serde(default)]
    pub username: Option<String>,

    /// Upper bound on credential + WebSocket handshake
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long `close()` waits for the gateway to confirm
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,

    /// Defaults applied to queries that leave a field unset
    #[serde(default)]
    pub query: QueryDefaults,
}

/// Per-query defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDefaults {
    #[serde(default)]
    pub engine: EngineType,

    #[serde(default)]
    pub split_access: bool,

    #[serde(default = "default_split_size_mb")]
    pub split_size_mb: u64,
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_close_timeout_secs() -> u64 {
    5
}

fn default_split_size_mb() -> u64 {
    500
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            engine: EngineType::Duckdb,
            split_access: false,
            split_size_mb: default_split_size_mb(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: Region::default(),
            endpoint_url: None,
            username: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            close_timeout_secs: default_close_timeout_secs(),
            query: QueryDefaults::default(),
        }
    }
}

impl ClientConfig {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

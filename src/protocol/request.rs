//! Outbound query payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    SqlQuery,
}

/// Query engine the gateway should run the statement on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineType {
    #[default]
    Duckdb,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossRegionPolicy {
    Disallowed,
    Allowed,
    Selected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheMode {
    None,
    MemoryCopy,
    FsCopy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputType {
    S3,
    WebSocket,
    File,
    Kafka,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputFormat {
    Parquet,
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompressionType {
    None,
    Snappy,
    Zstd,
    Gzip,
}

/// Where the gateway should write results besides the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub output_type: OutputType,
    pub output_path: String,
    pub output_format: OutputFormat,
    pub output_compression: CompressionType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// Hook source text as shipped to the remote engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_func: Option<String>,
}

/// The `SQL_QUERY` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub message_type: MessageType,
    pub request_id: String,
    pub sql: String,
    /// Row offset to start delivering from
    pub scan_cursor: u64,
    pub engine: EngineType,
    pub split_access: bool,
    #[serde(rename = "splitSizeMB")]
    pub split_size_mb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_hooks: Option<HookSources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_region_policy: Option<CrossRegionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_cache: Option<CacheMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_cache: Option<CacheMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Output>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
}

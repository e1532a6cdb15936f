//! Query requests.

use crate::config::QueryDefaults;
use crate::dispatch::Callbacks;
use crate::hooks::Hooks;
use crate::protocol::{
    CacheMode, CrossRegionPolicy, EngineType, MessageType, Output, QueryPayload, Tag,
};

/// One logical query. Unset fields fall back to the session's
/// `QueryDefaults`.
///
/// ```ignore
/// let query = Query::new("SELECT * FROM parquet_scan('s3://bucket/data.parquet') LIMIT 10")
///     .with_engine(EngineType::Duckdb)
///     .with_callbacks(Callbacks::new().on_data(|e| println!("{} rows", e.rows().len())));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub sql: String,
    /// Correlation id; a UUID is generated when unset
    pub request_id: Option<String>,
    /// Row offset to start delivering from
    pub scan_cursor: Option<u64>,
    pub engine: Option<EngineType>,
    pub split_access: Option<bool>,
    pub split_size_mb: Option<u64>,
    pub hooks: Hooks,
    pub cross_region_policy: Option<CrossRegionPolicy>,
    pub allowed_regions: Vec<String>,
    pub read_cache: Option<CacheMode>,
    pub write_cache: Option<CacheMode>,
    pub outputs: Vec<Output>,
    pub tags: Vec<Tag>,
    pub callbacks: Callbacks,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_scan_cursor(mut self, scan_cursor: u64) -> Self {
        self.scan_cursor = Some(scan_cursor);
        self
    }

    pub fn with_engine(mut self, engine: EngineType) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_split_access(mut self, split_access: bool, split_size_mb: Option<u64>) -> Self {
        self.split_access = Some(split_access);
        self.split_size_mb = split_size_mb.or(self.split_size_mb);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_cross_region(mut self, policy: CrossRegionPolicy, allowed: Vec<String>) -> Self {
        self.cross_region_policy = Some(policy);
        self.allowed_regions = allowed;
        self
    }

    pub fn with_cache(mut self, read: Option<CacheMode>, write: Option<CacheMode>) -> Self {
        self.read_cache = read;
        self.write_cache = write;
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Build the wire payload for `request_id`.
    pub fn to_payload(&self, request_id: &str, defaults: &QueryDefaults) -> QueryPayload {
        QueryPayload {
            message_type: MessageType::SqlQuery,
            request_id: request_id.to_string(),
            sql: self.sql.clone(),
            scan_cursor: self.scan_cursor.unwrap_or(0),
            engine: self.engine.unwrap_or(defaults.engine),
            split_access: self.split_access.unwrap_or(defaults.split_access),
            split_size_mb: self.split_size_mb.unwrap_or(defaults.split_size_mb),
            js_hooks: self.hooks.to_sources(),
            cross_region_policy: self.cross_region_policy,
            allowed_regions: non_empty(&self.allowed_regions),
            read_cache: self.read_cache,
            write_cache: self.write_cache,
            outputs: non_empty(&self.outputs),
            tags: non_empty(&self.tags),
        }
    }
}

fn non_empty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    (!items.is_empty()).then(|| items.to_vec())
}

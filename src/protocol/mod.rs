//! Query Gateway Wire Protocol
//!
//! Single responsibility: the JSON shapes exchanged with the query gateway.
//!
//! | Module    | Responsibility                                      |
//! |-----------|-----------------------------------------------------|
//! | `request` | Outbound `SQL_QUERY` payload and its option enums   |
//! | `event`   | Typed inbound events and data-batch progress fields |
//! | `decode`  | Raw frame to `Event`, never failing past itself     |
//!
//! ## Outbound
//! ```text
//! { "messageType": "SQL_QUERY", "requestId": "...", "sql": "...",
//!   "scanCursor": 0, "engine": "DUCKDB", "splitAccess": false,
//!   "splitSizeMB": 500, "jsHooks": { ... }, ... }
//! ```
//!
//! ## Inbound
//! ```text
//! { "messageType": "DATA", "requestId": "...", "data": [ ... ],
//!   "batchSerial": 1, "totalBatches": 2,
//!   "splitSerial": 1, "totalSplitSerials": 2,
//!   "subBatchSerial": 3, "totalSubBatches": 4 }
//!
//! { "messageType": "LOG_MESSAGE", "logLevel": "WARN", "requestId": "...", ... }
//! ```

mod decode;
mod event;
mod request;

pub use decode::{decode, LOG_MESSAGE};
pub use event::{DataProgress, Event, EventKind};
pub use request::{
    CacheMode, CompressionType, CrossRegionPolicy, EngineType, HookSources, MessageType, Output,
    OutputFormat, OutputType, QueryPayload, Tag,
};

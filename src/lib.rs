//! BoilingData Client - multiplexed SQL queries over one WebSocket
//!
//! Sends SQL to the BoilingData gateway and reassembles the result stream,
//! which arrives as batches (optionally split, optionally sub-batched) in no
//! particular order.
//!
//! ## Architecture
//!
//! ```text
//! QuerySession ──send──▶ ConnectionManager ──▶ gateway
//!      │                        │
//!      │ register               │ receive task
//!      ▼                        ▼
//!  Dispatcher ◀──── decode(frame) ─── Event
//!      │
//!      ├─▶ callbacks (session-wide, then per request)
//!      └─▶ CompletionTracker ──▶ QUERY_FINISHED
//! ```
//!
//! ## Why a Completion Tracker?
//!
//! | Gateway behaviour | Consequence |
//! |-------------------|-------------|
//! | Workers finish in any order | Batch 3 can arrive before batch 1 |
//! | Batches may split or sub-batch | One batch serial, many messages |
//! | No end-of-query frame | Completion is inferred from declared totals |
//!
//! ## Configuration
//!
//! ```text
//! ~/.config/boilingdata/
//! └── config.toml            # ClientConfig
//! ```

pub mod config;
pub mod connection;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod protocol;
pub mod query;
pub mod session;
pub mod tracker;

// Re-exports
pub use config::{ClientConfig, QueryDefaults};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use credentials::{
    Credential, CredentialSupplier, EndpointSigner, IdToken, IdentityCredentialSupplier,
    IdentityProvider, Region, Secret, StaticCredentialSupplier,
};
pub use dispatch::{CallbackName, Callbacks};
pub use error::{ClientError, Result};
pub use hooks::{Hook, HookSlot, Hooks, ReturnShape};
pub use protocol::{DataProgress, EngineType, Event, EventKind};
pub use query::Query;
pub use session::QuerySession;
pub use tracker::{CompletionTracker, Observation};

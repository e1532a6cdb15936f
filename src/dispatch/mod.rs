//! Event Dispatch
//!
//! Routes every decoded event to zero or more handlers:
//!
//! 1. the process-wide table given when the session was built,
//! 2. the table registered with the request the event belongs to.
//!
//! Data events also feed the completion tracker, and the event that completes
//! a request is followed by a synthesized `QUERY_FINISHED`.

mod callbacks;
mod dispatcher;

pub use callbacks::{CallbackName, Callbacks, Handler};
pub use dispatcher::{Dispatcher, Routed, SharedDispatcher};

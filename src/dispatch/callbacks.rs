//! Callback tables.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::protocol::{Event, EventKind};

/// An event handler. Runs on the connection's receive task, so it must not
/// block.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Slot a handler is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackName {
    OnRequest,
    OnData,
    OnInfo,
    OnLogError,
    OnLogWarn,
    OnLogInfo,
    OnLogDebug,
    OnLambdaEvent,
    OnQueryFinished,
    OnSocketOpen,
    OnSocketClose,
    OnUnknown,
}

impl CallbackName {
    /// Fixed routing from event kind to handler slot.
    pub fn for_kind(kind: &EventKind) -> Self {
        match kind {
            EventKind::Request => CallbackName::OnRequest,
            EventKind::Data => CallbackName::OnData,
            EventKind::Info => CallbackName::OnInfo,
            EventKind::Error | EventKind::LogError => CallbackName::OnLogError,
            EventKind::LogWarn => CallbackName::OnLogWarn,
            EventKind::LogInfo => CallbackName::OnLogInfo,
            EventKind::LogDebug => CallbackName::OnLogDebug,
            EventKind::LambdaEvent => CallbackName::OnLambdaEvent,
            EventKind::QueryFinished => CallbackName::OnQueryFinished,
            EventKind::SocketOpen => CallbackName::OnSocketOpen,
            EventKind::SocketClosed => CallbackName::OnSocketClose,
            EventKind::Unknown(_) => CallbackName::OnUnknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallbackName::OnRequest => "onRequest",
            CallbackName::OnData => "onData",
            CallbackName::OnInfo => "onInfo",
            CallbackName::OnLogError => "onLogError",
            CallbackName::OnLogWarn => "onLogWarn",
            CallbackName::OnLogInfo => "onLogInfo",
            CallbackName::OnLogDebug => "onLogDebug",
            CallbackName::OnLambdaEvent => "onLambdaEvent",
            CallbackName::OnQueryFinished => "onQueryFinished",
            CallbackName::OnSocketOpen => "onSocketOpen",
            CallbackName::OnSocketClose => "onSocketClose",
            CallbackName::OnUnknown => "onUnknown",
        }
    }
}

impl fmt::Display for CallbackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of optional handlers, one per `CallbackName`.
///
/// ```ignore
/// let callbacks = Callbacks::new()
///     .on_data(|event| println!("{} rows", event.rows().len()))
///     .on_query_finished(|event| println!("done: {:?}", event.request_id));
/// ```
#[derive(Clone, Default)]
pub struct Callbacks {
    handlers: HashMap<CallbackName, Handler>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: CallbackName) -> Option<&Handler> {
        self.handlers.get(&name)
    }

    pub fn set(&mut self, name: CallbackName, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn with<F>(mut self, name: CallbackName, handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.set(name, Arc::new(handler));
        self
    }

    pub fn on_request(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnRequest, f)
    }

    pub fn on_data(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnData, f)
    }

    pub fn on_info(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnInfo, f)
    }

    pub fn on_log_error(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnLogError, f)
    }

    pub fn on_log_warn(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnLogWarn, f)
    }

    pub fn on_log_info(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnLogInfo, f)
    }

    pub fn on_log_debug(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnLogDebug, f)
    }

    pub fn on_lambda_event(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnLambdaEvent, f)
    }

    pub fn on_query_finished(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnQueryFinished, f)
    }

    pub fn on_socket_open(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnSocketOpen, f)
    }

    pub fn on_socket_close(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnSocketClose, f)
    }

    /// Catch-all for event kinds this client does not recognise.
    pub fn on_unknown(self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.with(CallbackName::OnUnknown, f)
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("Callbacks").field("registered", &names).finish()
    }
}

//! Event routing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use super::callbacks::{CallbackName, Callbacks, Handler};
use crate::protocol::{Event, EventKind};
use crate::tracker::{CompletionTracker, Observation};

/// Routes decoded events to handlers and drives completion tracking.
///
/// Owns every piece of per-request state on a connection: the per-request
/// callback tables and the completion tracker. Both are dropped together when
/// a request finishes or is abandoned.
#[derive(Debug, Default)]
pub struct Dispatcher {
    global: Callbacks,
    requests: HashMap<String, Callbacks>,
    tracker: CompletionTracker,
}

impl Dispatcher {
    pub fn new(global: Callbacks) -> Self {
        Self {
            global,
            requests: HashMap::new(),
            tracker: CompletionTracker::new(),
        }
    }

    /// Start routing events for `request_id` to `callbacks` and tracking its
    /// batches.
    pub fn register(&mut self, request_id: &str, callbacks: Callbacks) {
        self.requests.insert(request_id.to_string(), callbacks);
        self.tracker.register(request_id);
    }

    /// Drop all state for a request. Returns whether anything was registered.
    pub fn abandon(&mut self, request_id: &str) -> bool {
        let had_callbacks = self.requests.remove(request_id).is_some();
        let had_state = self.tracker.remove(request_id).is_some();
        had_callbacks || had_state
    }

    pub fn is_registered(&self, request_id: &str) -> bool {
        self.requests.contains_key(request_id)
    }

    /// Number of requests still awaiting completion.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    /// Deliver one event.
    ///
    /// Global handler first, then the request's own handler. Data events then
    /// feed the tracker, and the message that completes a request is followed
    /// by a synthesized `QUERY_FINISHED` for it.
    pub fn dispatch(&mut self, event: &Event) {
        self.route(event).invoke(event);
    }

    /// Resolve the handlers for one event and update completion state,
    /// without running any handler.
    ///
    /// A completed request is already forgotten when this returns; its
    /// handlers travel in the returned `Routed`.
    pub fn route(&mut self, event: &Event) -> Routed {
        let mut routed = Routed {
            handlers: self.handlers_for(event),
            finished: None,
        };

        let Some(request_id) = event.request_id.as_deref() else {
            return routed;
        };
        if event.kind != EventKind::Data {
            return routed;
        }

        if let Observation::Completed = self.tracker.observe(request_id, &event.progress()) {
            debug!(request_id = %request_id, "Query finished");
            let finished = Event::new(
                EventKind::QueryFinished,
                Some(request_id.to_string()),
                event.payload.clone(),
            );
            let handlers = self.handlers_for(&finished);
            routed.finished = Some((finished, handlers));
            self.abandon(request_id);
        }
        routed
    }

    fn handlers_for(&self, event: &Event) -> Vec<Handler> {
        let name = CallbackName::for_kind(&event.kind);
        if name == CallbackName::OnUnknown {
            debug!(kind = %event.kind, "Unrecognised event kind");
        }
        trace!(kind = %event.kind, request_id = ?event.request_id, callback = %name, "Dispatching");

        let request = event
            .request_id
            .as_deref()
            .and_then(|id| self.requests.get(id))
            .and_then(|cbs| cbs.get(name));
        self.global
            .get(name)
            .into_iter()
            .chain(request)
            .cloned()
            .collect()
    }
}

/// Handlers resolved for one event, ready to run once the dispatcher is
/// unlocked.
#[must_use]
pub struct Routed {
    handlers: Vec<Handler>,
    finished: Option<(Event, Vec<Handler>)>,
}

impl Routed {
    /// Run the handlers for `event`, then those for the `QUERY_FINISHED` it
    /// triggered, if any.
    pub fn invoke(self, event: &Event) {
        for handler in &self.handlers {
            handler(event);
        }
        if let Some((finished, handlers)) = &self.finished {
            for handler in handlers {
                handler(finished);
            }
        }
    }
}

/// The dispatcher of one connection, shared between the receive task and
/// request registration.
///
/// Locks are held only for a registration or the routing of one event, never
/// while a handler runs and never across an await.
#[derive(Debug, Clone, Default)]
pub struct SharedDispatcher(Arc<Mutex<Dispatcher>>);

impl SharedDispatcher {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self(Arc::new(Mutex::new(dispatcher)))
    }

    /// Lock the dispatcher. A handler that panicked mid-dispatch does not
    /// take the connection down with it.
    pub fn lock(&self) -> MutexGuard<'_, Dispatcher> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver one event. Handlers run after the lock is released, so they
    /// may call back into the dispatcher (e.g. to abandon their request).
    pub fn dispatch(&self, event: &Event) {
        let routed = self.lock().route(event);
        routed.invoke(event);
    }
}

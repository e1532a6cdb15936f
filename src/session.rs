//! Query Session
//!
//! Callers submit queries here and never touch connection state: a closed
//! socket is reopened on demand before the payload goes out.
//!
//! # Usage
//!
//! ```ignore
//! let session = QuerySession::new(&config, supplier, Callbacks::new());
//!
//! // Callback form: events stream into the query's handlers
//! let request_id = session
//!     .execute(Query::new(sql).with_callbacks(Callbacks::new().on_data(|e| handle(e))))
//!     .await?;
//!
//! // Collect form: resolves with every row once the query has finished
//! let rows = tokio::time::timeout(limit, session.execute_collect(Query::new(sql))).await??;
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ClientConfig, QueryDefaults};
use crate::connection::{ConnectionConfig, ConnectionManager, ConnectionState};
use crate::credentials::CredentialSupplier;
use crate::dispatch::{CallbackName, Callbacks, Dispatcher, Handler, SharedDispatcher};
use crate::error::{ClientError, Result};
use crate::protocol::{Event, EventKind, QueryPayload};
use crate::query::Query;

/// Queries multiplexed over one gateway connection.
pub struct QuerySession {
    defaults: QueryDefaults,
    connection: ConnectionManager,
}

impl QuerySession {
    /// Build a session. Nothing connects until the first query or an
    /// explicit `connect()`.
    ///
    /// `callbacks` receive every event on the connection, for all requests.
    pub fn new(
        config: &ClientConfig,
        supplier: Arc<dyn CredentialSupplier>,
        callbacks: Callbacks,
    ) -> Self {
        let dispatcher = SharedDispatcher::new(Dispatcher::new(callbacks));
        Self {
            defaults: config.query.clone(),
            connection: ConnectionManager::new(ConnectionConfig::from(config), supplier, dispatcher),
        }
    }

    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    pub async fn close(&self) -> Result<()> {
        self.connection.close().await
    }

    /// Reopen the connection with a fresh credential. Requests in flight stay
    /// registered and keep receiving events if the gateway resumes them.
    pub async fn reconnect(&self) -> Result<()> {
        self.connection.reconnect().await
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Number of requests still awaiting completion.
    pub fn in_flight(&self) -> usize {
        self.dispatcher().lock().in_flight()
    }

    /// Stop tracking a request and drop its callbacks. Later events for it
    /// still reach the session-wide callbacks.
    pub fn abandon(&self, request_id: &str) -> bool {
        self.dispatcher().lock().abandon(request_id)
    }

    fn dispatcher(&self) -> &SharedDispatcher {
        self.connection.dispatcher()
    }

    /// Submit a query and return its request id.
    ///
    /// Events for the query go to its own callbacks (and the session-wide
    /// ones). `onQueryFinished` fires once every declared batch has arrived.
    ///
    /// # Errors
    /// - `HookValidation` before anything is registered or sent
    /// - `Configuration` if the request id is already in flight
    /// - connect or send failures; the request is forgotten again
    pub async fn execute(&self, query: Query) -> Result<String> {
        query.hooks.validate()?;

        let request_id = query
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let payload = query.to_payload(&request_id, &self.defaults);

        {
            let mut dispatcher = self.dispatcher().lock();
            if dispatcher.is_registered(&request_id) {
                return Err(ClientError::Configuration(format!(
                    "Request {} is already in flight",
                    request_id
                )));
            }
            dispatcher.register(&request_id, query.callbacks);
        }

        let mut pending = AbandonOnDrop::new(self.dispatcher().clone(), &request_id);
        if let Err(e) = self.submit(&payload).await {
            warn!(request_id = %request_id, error = %e, "Query submission failed");
            return Err(e);
        }
        pending.disarm();

        info!(request_id = %request_id, engine = ?payload.engine, "Query submitted");
        Ok(request_id)
    }

    async fn submit(&self, payload: &QueryPayload) -> Result<()> {
        if !self.connection.is_open() {
            debug!(request_id = %payload.request_id, "Connection not open, connecting");
            self.connection.connect().await?;
        }

        self.dispatcher().dispatch(&Event::new(
            EventKind::Request,
            Some(payload.request_id.clone()),
            serde_json::to_value(payload)?,
        ));

        self.connection.send(payload).await
    }

    /// Submit a query and resolve with all of its rows once it has finished.
    ///
    /// Rows are ordered by batch, then sub-batch, then position within the
    /// delivered batch. That is the best the gateway allows; queries needing
    /// a total order must say so in their SQL. The split serial is not a
    /// key, so rows of two splits of one batch interleave by position.
    ///
    /// Handlers already set on the query still run. Dropping the returned
    /// future (e.g. from a caller's timeout) abandons the request.
    ///
    /// # Errors
    /// - anything `execute()` returns
    /// - `RemoteQuery` with the error payload when the gateway reports an
    ///   error for this request
    pub async fn execute_collect(&self, mut query: Query) -> Result<Vec<Value>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        query.callbacks = collecting(std::mem::take(&mut query.callbacks), tx);

        let request_id = self.execute(query).await?;
        let mut pending = AbandonOnDrop::new(self.dispatcher().clone(), &request_id);

        let mut chunks = Vec::new();
        while let Some(delivery) = rx.recv().await {
            match delivery {
                Delivery::Rows(chunk) => chunks.push(chunk),
                Delivery::Finished => {
                    pending.disarm();
                    debug!(request_id = %request_id, chunks = chunks.len(), "Collect finished");
                    return Ok(order_rows(chunks));
                }
                Delivery::Failed(payload) => {
                    warn!(request_id = %request_id, "Query failed remotely");
                    return Err(ClientError::RemoteQuery(payload));
                }
            }
        }

        // Every sender lives in the request's callbacks, so this means they
        // were dropped by an explicit abandon.
        Err(ClientError::Configuration(format!(
            "Request {} was abandoned before it finished",
            request_id
        )))
    }
}

/// Rows of one data event, tagged with where they came from.
#[derive(Debug)]
struct RowChunk {
    batch: u64,
    sub_batch: u64,
    rows: Vec<Value>,
}

#[derive(Debug)]
enum Delivery {
    Rows(RowChunk),
    Finished,
    Failed(Value),
}

/// Layer collection over the caller's own handlers.
fn collecting(callbacks: Callbacks, tx: mpsc::UnboundedSender<Delivery>) -> Callbacks {
    let on_data = {
        let tx = tx.clone();
        move |event: &Event| {
            let progress = event.progress();
            let _ = tx.send(Delivery::Rows(RowChunk {
                batch: progress.batch_serial.unwrap_or(0),
                sub_batch: progress.sub_batch_serial.unwrap_or(0),
                rows: event.rows().to_vec(),
            }));
        }
    };
    let on_finished = {
        let tx = tx.clone();
        move |_: &Event| {
            let _ = tx.send(Delivery::Finished);
        }
    };
    let on_error = move |event: &Event| {
        let _ = tx.send(Delivery::Failed(event.payload.clone()));
    };

    let data = chain(callbacks.get(CallbackName::OnData).cloned(), on_data);
    let finished = chain(callbacks.get(CallbackName::OnQueryFinished).cloned(), on_finished);
    let failed = chain(callbacks.get(CallbackName::OnLogError).cloned(), on_error);

    let mut callbacks = callbacks;
    callbacks.set(CallbackName::OnData, data);
    callbacks.set(CallbackName::OnQueryFinished, finished);
    callbacks.set(CallbackName::OnLogError, failed);
    callbacks
}

/// Caller's handler first, then ours.
fn chain(existing: Option<Handler>, next: impl Fn(&Event) + Send + Sync + 'static) -> Handler {
    match existing {
        Some(first) => Arc::new(move |event: &Event| {
            first(event);
            next(event);
        }),
        None => Arc::new(next),
    }
}

/// Stable sort on (batch, sub-batch, row index); the row index restarts
/// with every chunk.
fn order_rows(chunks: Vec<RowChunk>) -> Vec<Value> {
    let mut tagged: Vec<(u64, u64, usize, Value)> = chunks
        .into_iter()
        .flat_map(|RowChunk { batch, sub_batch, rows }| {
            rows.into_iter()
                .enumerate()
                .map(move |(index, row)| (batch, sub_batch, index, row))
        })
        .collect();
    tagged.sort_by_key(|(batch, sub_batch, index, _)| (*batch, *sub_batch, *index));
    tagged.into_iter().map(|(_, _, _, row)| row).collect()
}

/// Forgets a request unless disarmed, so a dropped future does not leave
/// state behind.
struct AbandonOnDrop {
    dispatcher: SharedDispatcher,
    request_id: Option<String>,
}

impl AbandonOnDrop {
    fn new(dispatcher: SharedDispatcher, request_id: &str) -> Self {
        Self {
            dispatcher,
            request_id: Some(request_id.to_string()),
        }
    }

    fn disarm(&mut self) {
        self.request_id = None;
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if let Some(request_id) = self.request_id.take() {
            if self.dispatcher.lock().abandon(&request_id) {
                debug!(request_id = %request_id, "Request abandoned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialSupplier;
    use crate::hooks::{Hook, Hooks, ReturnShape};
    use serde_json::json;
    use std::sync::Mutex;

    fn chunk(batch: u64, sub_batch: u64, rows: Vec<Value>) -> RowChunk {
        RowChunk {
            batch,
            sub_batch,
            rows,
        }
    }

    fn session(endpoint: &str) -> QuerySession {
        QuerySession::new(
            &ClientConfig {
                connect_timeout_secs: 2,
                ..Default::default()
            },
            Arc::new(StaticCredentialSupplier::new("alice", endpoint)),
            Callbacks::new(),
        )
    }

    #[test]
    fn test_order_rows_by_batch_then_sub_batch_then_index() {
        let ordered = order_rows(vec![
            chunk(2, 0, vec![json!("b2-0"), json!("b2-1")]),
            chunk(1, 2, vec![json!("b1s2-0")]),
            chunk(1, 1, vec![json!("b1s1-0"), json!("b1s1-1")]),
        ]);
        assert_eq!(
            ordered,
            vec![
                json!("b1s1-0"),
                json!("b1s1-1"),
                json!("b1s2-0"),
                json!("b2-0"),
                json!("b2-1")
            ]
        );
    }

    #[test]
    fn test_order_rows_keeps_arrival_order_on_ties() {
        let ordered = order_rows(vec![
            chunk(0, 0, vec![json!("first")]),
            chunk(0, 0, vec![json!("second")]),
        ]);
        assert_eq!(ordered, vec![json!("first"), json!("second")]);
    }

    #[test]
    fn test_order_rows_interleaves_splits_of_one_batch() {
        let ordered = order_rows(vec![
            chunk(1, 0, vec![json!("s1-a"), json!("s1-b")]),
            chunk(1, 0, vec![json!("s2-a"), json!("s2-b")]),
        ]);
        assert_eq!(
            ordered,
            vec![json!("s1-a"), json!("s2-a"), json!("s1-b"), json!("s2-b")]
        );
    }

    #[test]
    fn test_collecting_keeps_caller_handlers() {
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let callbacks = collecting(
            Callbacks::new().on_data(move |_| *counter.lock().unwrap() += 1),
            tx,
        );

        let event = Event::new(
            EventKind::Data,
            Some("r1".into()),
            json!({ "data": [1, 2], "batchSerial": 3 }),
        );
        callbacks.get(CallbackName::OnData).unwrap()(&event);

        assert_eq!(*seen.lock().unwrap(), 1);
        match rx.try_recv().unwrap() {
            Delivery::Rows(chunk) => {
                assert_eq!(chunk.batch, 3);
                assert_eq!(chunk.sub_batch, 0);
                assert_eq!(chunk.rows.len(), 2);
            }
            other => panic!("unexpected delivery {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_hook_rejected_before_registration() {
        let session = session("ws://127.0.0.1:1");
        let query = Query::new("SELECT 1").with_hooks(Hooks {
            header: Some(Hook::new("(ctx, row) => ctx", 2, ReturnShape::Value)),
            ..Default::default()
        });

        let err = session.execute(query).await.unwrap_err();
        assert!(matches!(err, ClientError::HookValidation { .. }));
        assert_eq!(session.in_flight(), 0);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_connect_forgets_request() {
        let session = session("ws://127.0.0.1:1");
        let err = session
            .execute(Query::new("SELECT 1").with_request_id("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(session.in_flight(), 0);
        assert!(!session.abandon("r1"));
    }
}

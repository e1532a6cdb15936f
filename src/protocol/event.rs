//! Typed inbound events.

use serde_json::Value;
use std::fmt;

/// What an inbound (or locally synthesized) event is about.
///
/// The wire may introduce kinds this client does not know yet; those are kept
/// verbatim in `Unknown` instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Request,
    Data,
    Info,
    Error,
    LogError,
    LogWarn,
    LogInfo,
    LogDebug,
    LambdaEvent,
    QueryFinished,
    SocketOpen,
    SocketClosed,
    Unknown(String),
}

impl EventKind {
    /// Classify a declared `messageType`.
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "REQUEST" => EventKind::Request,
            "DATA" => EventKind::Data,
            "INFO" => EventKind::Info,
            "ERROR" => EventKind::Error,
            "LOG_ERROR" => EventKind::LogError,
            "LOG_WARN" => EventKind::LogWarn,
            "LOG_INFO" => EventKind::LogInfo,
            "LOG_DEBUG" => EventKind::LogDebug,
            "LAMBDA_EVENT" => EventKind::LambdaEvent,
            "QUERY_FINISHED" => EventKind::QueryFinished,
            "SOCKET_OPEN" => EventKind::SocketOpen,
            "SOCKET_CLOSED" => EventKind::SocketClosed,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    /// Classify the `logLevel` of a `LOG_MESSAGE`.
    ///
    /// Accepts `WARN` as well as `LOG_WARN`, in any case.
    pub fn from_log_level(level: &str) -> Self {
        let upper = level.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("LOG_").unwrap_or(&upper);
        match bare {
            "ERROR" | "FATAL" => EventKind::LogError,
            "WARN" | "WARNING" => EventKind::LogWarn,
            "INFO" => EventKind::LogInfo,
            "DEBUG" | "TRACE" => EventKind::LogDebug,
            _ => EventKind::Unknown(level.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Request => "REQUEST",
            EventKind::Data => "DATA",
            EventKind::Info => "INFO",
            EventKind::Error => "ERROR",
            EventKind::LogError => "LOG_ERROR",
            EventKind::LogWarn => "LOG_WARN",
            EventKind::LogInfo => "LOG_INFO",
            EventKind::LogDebug => "LOG_DEBUG",
            EventKind::LambdaEvent => "LAMBDA_EVENT",
            EventKind::QueryFinished => "QUERY_FINISHED",
            EventKind::SocketOpen => "SOCKET_OPEN",
            EventKind::SocketClosed => "SOCKET_CLOSED",
            EventKind::Unknown(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded event, correlated to a request when `request_id` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub request_id: Option<String>,
    /// The full inbound message (or the synthesized body for local events).
    pub payload: Value,
}

impl Event {
    pub fn new(kind: EventKind, request_id: Option<String>, payload: Value) -> Self {
        Self {
            kind,
            request_id,
            payload,
        }
    }

    /// Rows carried by a data event. Empty for every other shape.
    pub fn rows(&self) -> &[Value] {
        self.payload
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Batch bookkeeping fields of a data event.
    pub fn progress(&self) -> DataProgress {
        DataProgress::from_payload(&self.payload)
    }
}

/// Position of one data message within the batch / split / sub-batch
/// hierarchy, plus whatever totals it declares.
///
/// Serials are 1-based on the wire; a `0` is treated the same as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataProgress {
    pub batch_serial: Option<u64>,
    pub total_batches: Option<u64>,
    pub split_serial: Option<u64>,
    pub total_split_serials: Option<u64>,
    pub sub_batch_serial: Option<u64>,
    pub total_sub_batches: Option<u64>,
}

impl DataProgress {
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            batch_serial: positive(payload, "batchSerial"),
            total_batches: positive(payload, "totalBatches"),
            split_serial: positive(payload, "splitSerial"),
            total_split_serials: positive(payload, "totalSplitSerials"),
            sub_batch_serial: positive(payload, "subBatchSerial"),
            total_sub_batches: positive(payload, "totalSubBatches"),
        }
    }

    /// Split serial and the batch's declared split total, when both are present.
    pub fn split(&self) -> Option<(u64, u64)> {
        self.split_serial.zip(self.total_split_serials)
    }

    /// Sub-batch serial and the parent's declared sub-batch total.
    pub fn sub_batch(&self) -> Option<(u64, u64)> {
        self.sub_batch_serial.zip(self.total_sub_batches)
    }
}

fn positive(payload: &Value, key: &str) -> Option<u64> {
    payload.get(key).and_then(Value::as_u64).filter(|n| *n > 0)
}

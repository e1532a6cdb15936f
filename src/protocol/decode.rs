//! Frame decoding.
//!
//! `decode` always yields an `Event`. Anything that cannot be classified
//! becomes a synthetic `LOG_ERROR` carrying the error text and whatever
//! fields could be recovered, so one bad frame never stalls the stream.

use serde_json::{Map, Value};
use tracing::warn;

use super::event::{Event, EventKind};
use crate::error::ClientError;

/// Sentinel `messageType` whose effective kind is its `logLevel`.
pub const LOG_MESSAGE: &str = "LOG_MESSAGE";

/// Decode one inbound frame.
pub fn decode(frame: &[u8]) -> Event {
    let value = match serde_json::from_slice::<Value>(frame) {
        Ok(value) => value,
        Err(e) => {
            let raw = String::from_utf8_lossy(frame);
            return decode_failure(ClientError::from(e), Map::new(), scrape_request_id(&raw));
        }
    };

    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            let mut partial = Map::new();
            partial.insert("raw".to_string(), other);
            return decode_failure(
                ClientError::Decode("frame is not a JSON object".into()),
                partial,
                None,
            );
        }
    };

    let request_id = fields
        .get("requestId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let kind = match classify(&fields) {
        Ok(kind) => kind,
        Err(e) => return decode_failure(e, fields, request_id),
    };

    Event::new(kind, request_id, Value::Object(fields))
}

fn classify(fields: &Map<String, Value>) -> Result<EventKind, ClientError> {
    let declared = fields
        .get("messageType")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Decode("missing messageType".into()))?;

    if declared != LOG_MESSAGE {
        return Ok(EventKind::from_wire(declared));
    }

    fields
        .get("logLevel")
        .and_then(Value::as_str)
        .map(EventKind::from_log_level)
        .ok_or_else(|| ClientError::Decode("LOG_MESSAGE without logLevel".into()))
}

fn decode_failure(
    error: ClientError,
    mut partial: Map<String, Value>,
    request_id: Option<String>,
) -> Event {
    warn!(error = %error, request_id = ?request_id, "Undecodable frame");
    partial.insert("error".to_string(), Value::String(error.to_string()));
    if let Some(ref id) = request_id {
        partial
            .entry("requestId")
            .or_insert_with(|| Value::String(id.clone()));
    }
    Event::new(EventKind::LogError, request_id, Value::Object(partial))
}

/// Best-effort recovery of `"requestId": "..."` from text that is not valid
/// JSON, so the error can still reach the owning request.
fn scrape_request_id(raw: &str) -> Option<String> {
    let after_key = &raw[raw.find("\"requestId\"")? + "\"requestId\"".len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();
    let body = after_colon.strip_prefix('"')?;
    let id = &body[..body.find('"')?];
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_data_event() {
        let frame = br#"{"messageType":"DATA","requestId":"r1","data":[{"a":1}],"batchSerial":1,"totalBatches":1}"#;
        let event = decode(frame);
        assert_eq!(event.kind, EventKind::Data);
        assert_eq!(event.request_id.as_deref(), Some("r1"));
        assert_eq!(event.rows(), &[json!({"a": 1})]);
    }

    #[test]
    fn test_log_message_uses_log_level() {
        let event = decode(br#"{"messageType":"LOG_MESSAGE","logLevel":"WARN","requestId":"r1"}"#);
        assert_eq!(event.kind, EventKind::LogWarn);
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let event = decode(br#"{"messageType":"QUEUE_POSITION","position":3}"#);
        assert_eq!(event.kind, EventKind::Unknown("QUEUE_POSITION".into()));
        assert!(event.payload.get("error").is_none());
    }

    #[test]
    fn test_large_integers_keep_precision() {
        let event = decode(
            br#"{"messageType":"DATA","requestId":"r1","data":[{"id":123456789012345678901234567890}]}"#,
        );
        let id = &event.rows()[0]["id"];
        assert_eq!(id.to_string(), "123456789012345678901234567890");
    }

    #[test]
    fn test_invalid_json_becomes_log_error_with_scraped_id() {
        let event = decode(br#"{"messageType":"DATA","requestId": "r-42","data":[1,2"#);
        assert_eq!(event.kind, EventKind::LogError);
        assert_eq!(event.request_id.as_deref(), Some("r-42"));
        assert!(event.payload["error"].as_str().unwrap().starts_with("JSON error"));
        assert_eq!(event.payload["requestId"], json!("r-42"));
    }

    #[test]
    fn test_missing_message_type_keeps_fields() {
        let event = decode(br#"{"requestId":"r1","note":"hello"}"#);
        assert_eq!(event.kind, EventKind::LogError);
        assert_eq!(event.request_id.as_deref(), Some("r1"));
        assert_eq!(event.payload["note"], json!("hello"));
        assert!(event.payload.get("error").is_some());
    }

    #[test]
    fn test_non_object_frame() {
        let event = decode(b"[1,2,3]");
        assert_eq!(event.kind, EventKind::LogError);
        assert_eq!(event.request_id, None);
        assert_eq!(event.payload["raw"], json!([1, 2, 3]));
    }

    #[test]
    fn test_scrape_request_id() {
        assert_eq!(
            scrape_request_id(r#"xx "requestId" :  "abc" yy"#),
            Some("abc".to_string())
        );
        assert_eq!(scrape_request_id(r#""requestId": 12"#), None);
        assert_eq!(scrape_request_id("garbage"), None);
    }
}

//! Trace message abstraction and the JSON-lines message format.
//!
//! The span reconstructor never sees the on-disk trace container. It only
//! talks to [`TraceMessage`], so any decoder that can answer these four
//! questions can feed the pipeline.

use serde::Deserialize;
use serde_json::{Map, Value};

/// A single message yielded by a unit-scoped trace stream
pub trait TraceMessage {
    /// Whether this is an event message (as opposed to packet/stream markers)
    fn is_event(&self) -> bool;

    /// Event timestamp in nanoseconds from the clock origin
    fn timestamp_ns(&self) -> Option<u64>;

    /// Event name, e.g. `define_region` or `regionid_enter`
    fn name(&self) -> &str;

    /// Look up the first payload field present among `candidates`
    fn field_or<'a>(&'a self, candidates: &[&str], default: &'a Value) -> &'a Value;
}

fn default_message_type() -> String {
    "event".to_string()
}

/// One line of a JSON-lines stream file
///
/// ```json
/// {"type": "event", "name": "regionid_enter", "timestamp_ns": 1200, "payload": {"regionid": 3}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    /// Message kind; only `event` messages carry timing data
    #[serde(default = "default_message_type", rename = "type")]
    pub message_type: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "ts", alias = "timestamp")]
    pub timestamp_ns: Option<u64>,

    #[serde(default, alias = "fields")]
    pub payload: Map<String, Value>,
}

impl RawMessage {
    /// Build an event message (used by tests and in-memory sources)
    pub fn event(name: impl Into<String>, timestamp_ns: u64, payload: Value) -> Self {
        Self {
            message_type: default_message_type(),
            name: name.into(),
            timestamp_ns: Some(timestamp_ns),
            payload: match payload {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

impl TraceMessage for RawMessage {
    fn is_event(&self) -> bool {
        self.message_type == "event"
    }

    fn timestamp_ns(&self) -> Option<u64> {
        self.timestamp_ns
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn field_or<'a>(&'a self, candidates: &[&str], default: &'a Value) -> &'a Value {
        candidates
            .iter()
            .find_map(|field| self.payload.get(*field))
            .unwrap_or(default)
    }
}

/// Parse an integer payload value from a number or a decimal/hex string
pub fn value_as_i64(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let text = value.as_str()?.trim();
    match text.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_with_aliases() {
        let msg: RawMessage =
            serde_json::from_str(r#"{"name":"regionid_exit","ts":42,"fields":{"regionid":7}}"#)
                .unwrap();
        assert!(msg.is_event());
        assert_eq!(msg.timestamp_ns(), Some(42));
        assert_eq!(msg.field_or(&["regionid"], &Value::Null), &json!(7));
    }

    #[test]
    fn test_non_event_message() {
        let msg: RawMessage = serde_json::from_str(r#"{"type":"packet_begin"}"#).unwrap();
        assert!(!msg.is_event());
        assert_eq!(msg.timestamp_ns(), None);
    }

    #[test]
    fn test_field_or_candidate_order() {
        let msg = RawMessage::event("define_region", 0, json!({"region_id": 2, "id": 1}));
        assert_eq!(msg.field_or(&["id", "region_id"], &Value::Null), &json!(1));
        assert_eq!(msg.field_or(&["missing"], &json!(-1)), &json!(-1));
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(value_as_i64(&json!(12)), Some(12));
        assert_eq!(value_as_i64(&json!("12")), Some(12));
        assert_eq!(value_as_i64(&json!("0x10")), Some(16));
        assert_eq!(value_as_i64(&json!(null)), None);
    }
}

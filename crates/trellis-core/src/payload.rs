//! Permissive action-payload parsing.
//!
//! Payloads reach the resolver from several upstream producers (postback
//! buttons, quick replies, referral refs, optin references) and their shapes
//! drifted over time. The parser therefore never fails: unknown shapes
//! degrade to treating the whole value as the action with empty data.

use serde_json::{Value, json};

/// A normalized "what the user is trying to do" pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAction {
    /// The action path. Not yet guaranteed absolute; callers resolve it
    /// against the current location.
    pub action: String,
    /// Data handed to the matched handler.
    pub data: Value,
}

impl ResolvedAction {
    /// Creates a resolved action with empty data.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: json!({}),
        }
    }

    /// Attaches handler data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Parses a payload value into an action plus data.
///
/// Accepted shapes, in order:
/// - a bare string — the action itself, unless it holds a JSON object, in
///   which case that object is parsed recursively;
/// - an object with an `action` string field (plus optional `data`);
/// - an object with a `payload` field holding a JSON string or nested
///   object, parsed recursively;
/// - anything else degrades to the stringified value as the action.
pub fn parse_payload(value: &Value) -> ResolvedAction {
    match value {
        Value::String(s) => parse_payload_str(s),
        Value::Object(map) => {
            if let Some(action) = map.get("action").and_then(Value::as_str) {
                let data = map.get("data").cloned().unwrap_or_else(|| json!({}));
                return ResolvedAction::new(action).with_data(data);
            }
            if let Some(payload) = map.get("payload") {
                return parse_payload(payload);
            }
            ResolvedAction::new(Value::Object(map.clone()).to_string())
        }
        Value::Null => ResolvedAction::new(""),
        other => ResolvedAction::new(stringify(other)),
    }
}

/// Parses a string payload, attempting an embedded-JSON decode first.
pub fn parse_payload_str(payload: &str) -> ResolvedAction {
    let trimmed = payload.trim();
    if trimmed.starts_with('{')
        && let Ok(parsed) = serde_json::from_str::<Value>(trimmed)
        && parsed.is_object()
    {
        return parse_payload(&parsed);
    }
    ResolvedAction::new(trimmed)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_is_the_action() {
        let r = parse_payload(&json!("/music/play"));
        assert_eq!(r.action, "/music/play");
        assert_eq!(r.data, json!({}));
    }

    #[test]
    fn object_with_action_and_data() {
        let r = parse_payload(&json!({ "action": "/buy", "data": { "sku": 7 } }));
        assert_eq!(r.action, "/buy");
        assert_eq!(r.data, json!({ "sku": 7 }));
    }

    #[test]
    fn payload_field_holding_a_json_string() {
        let r = parse_payload(&json!({ "payload": "{\"action\":\"/start\",\"data\":{\"a\":1}}" }));
        assert_eq!(r.action, "/start");
        assert_eq!(r.data, json!({ "a": 1 }));
    }

    #[test]
    fn payload_field_holding_a_nested_object() {
        let r = parse_payload(&json!({ "payload": { "action": "/nested" } }));
        assert_eq!(r.action, "/nested");
    }

    #[test]
    fn json_object_embedded_in_a_string() {
        let r = parse_payload(&json!("{\"action\":\"/deep\"}"));
        assert_eq!(r.action, "/deep");
    }

    #[test]
    fn unknown_shapes_degrade_without_failing() {
        let r = parse_payload(&json!(42));
        assert_eq!(r.action, "42");
        let r = parse_payload(&json!({ "something": "else" }));
        assert!(r.action.contains("something"));
    }
}

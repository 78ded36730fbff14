//! Per-sender conversation state.
//!
//! [`ConversationState`] is the persisted document owned exclusively by one
//! sender identifier. It carries arbitrary application variables plus two
//! reserved expectation fields the router's matching logic consults:
//!
//! - [`expected_action`](ConversationState::expected_action) — the action to
//!   run if the next event is bare free text with no stronger signal.
//! - [`expected_keywords`](ConversationState::expected_keywords) — ordered
//!   keyword triggers considered before falling back to `expected_action`.
//!
//! The invariant enforced by the processor: after any turn driven by a
//! user-initiated event that does not itself re-set these fields, both are
//! cleared. Stale expectations must not leak across turns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How many processed event timestamps are remembered per sender for
/// at-least-once delivery deduplication.
pub const DEDUP_WINDOW: usize = 10;

/// A stored "what the next free-text message means" hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    /// Absolute action path to run.
    pub action: String,
    /// Data handed to the action's handler.
    #[serde(default)]
    pub data: Value,
}

impl Expectation {
    /// Creates an expectation with empty data.
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            data,
        }
    }
}

/// A keyword trigger considered before the `expected_action` fallback.
///
/// `match_pattern` is a regular expression tested against the normalized
/// event text (see [`TextNormalizer`](crate::normalize::TextNormalizer)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordExpectation {
    /// Absolute action path to run on a match.
    pub action: String,
    /// Regex source matched against normalized text.
    pub match_pattern: String,
    /// Data handed to the action's handler.
    #[serde(default)]
    pub data: Value,
}

impl KeywordExpectation {
    /// Creates a keyword trigger with empty data.
    pub fn new(action: impl Into<String>, match_pattern: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            match_pattern: match_pattern.into(),
            data: Value::Null,
        }
    }

    /// Attaches trigger data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// The persisted per-sender conversation document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationState {
    /// Owning sender identifier.
    pub sender_id: String,
    /// Page the conversation belongs to.
    pub page_id: Option<String>,
    /// Reserved: action to run on the next bare free-text event.
    pub expected_action: Option<Expectation>,
    /// Reserved: keyword triggers checked before `expected_action`.
    pub expected_keywords: Option<Vec<KeywordExpectation>>,
    /// Arbitrary application-defined variables.
    pub vars: Map<String, Value>,
    /// Lock timestamp in ms; `0` means unlocked.
    pub lock: u64,
    /// Timestamps of the last [`DEDUP_WINDOW`] processed events.
    pub last_timestamps: Vec<i64>,
    /// Timestamp of the last outbound delivery failure.
    pub last_send_error: Option<i64>,
    /// Message of the last outbound delivery failure.
    pub last_error_message: Option<String>,
    /// Platform error code of the last outbound delivery failure.
    pub last_error_code: Option<i64>,
}

impl ConversationState {
    /// Creates an unlocked state for `sender_id`.
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            ..Self::default()
        }
    }

    /// Clears both reserved expectation fields.
    pub fn clear_expectations(&mut self) {
        self.expected_action = None;
        self.expected_keywords = None;
    }

    /// Returns `true` when `timestamp` was already processed for this sender.
    pub fn has_seen(&self, timestamp: i64) -> bool {
        self.last_timestamps.contains(&timestamp)
    }

    /// Records a processed event timestamp, keeping only the most recent
    /// [`DEDUP_WINDOW`] entries.
    pub fn remember_timestamp(&mut self, timestamp: i64) {
        self.last_timestamps.push(timestamp);
        if self.last_timestamps.len() > DEDUP_WINDOW {
            let overflow = self.last_timestamps.len() - DEDUP_WINDOW;
            self.last_timestamps.drain(..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_bounded_to_the_window() {
        let mut state = ConversationState::new("u1");
        for ts in 0..15 {
            state.remember_timestamp(ts);
        }
        assert_eq!(state.last_timestamps.len(), DEDUP_WINDOW);
        assert!(!state.has_seen(4));
        assert!(state.has_seen(5));
        assert!(state.has_seen(14));
    }

    #[test]
    fn clear_expectations_resets_both_fields() {
        let mut state = ConversationState::new("u1");
        state.expected_action = Some(Expectation::new("/fallback", Value::Null));
        state.expected_keywords = Some(vec![KeywordExpectation::new("/yes", "^yes$")]);
        state.clear_expectations();
        assert!(state.expected_action.is_none());
        assert!(state.expected_keywords.is_none());
    }

    #[test]
    fn state_serializes_with_camel_case_reserved_keys() {
        let mut state = ConversationState::new("u1");
        state.expected_action = Some(Expectation::new("/next", Value::Null));
        let v = serde_json::to_value(&state).unwrap();
        assert!(v.get("expectedAction").is_some());
        assert!(v.get("expectedKeywords").is_some());
    }
}

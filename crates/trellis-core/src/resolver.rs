//! Action resolution.
//!
//! [`ActionResolver`] derives the normalized action for a turn from the raw
//! event plus the prior conversation state. The rules form a total order
//! over disjoint input shapes — the first matching rule wins:
//!
//! 1. referral reference payload
//! 2. postback payload
//! 3. optin reference (base64-encoded JSON, raw-string fallback)
//! 4. quick-reply payload
//! 5. thread hand-off metadata (or the `pass-thread` sentinel)
//! 6. expected keywords — only an unambiguous single match counts
//! 7. expected action, verbatim
//! 8. nothing — the caller still dispatches plain messages so free-text
//!    handlers can run

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::event::Event;
use crate::normalize::{LatinFold, SharedNormalizer, TextNormalizer};
use crate::payload::{ResolvedAction, parse_payload, parse_payload_str};
use crate::state::ConversationState;

/// Sentinel action produced by a thread hand-off event without metadata.
pub const PASS_THREAD_ACTION: &str = "pass-thread";

/// An intent tag with a confidence score, produced by a pluggable scorer.
///
/// The resolver itself never calls the scorer; higher-level resolvers built
/// on this core attach scored intents to the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    /// Intent tag.
    pub tag: String,
    /// Confidence in `0.0..=1.0`.
    pub score: f32,
}

/// Derives a normalized action from an event plus conversation state.
#[derive(Clone)]
pub struct ActionResolver {
    normalizer: SharedNormalizer,
}

impl Default for ActionResolver {
    fn default() -> Self {
        Self {
            normalizer: Arc::new(LatinFold),
        }
    }
}

impl ActionResolver {
    /// Creates a resolver with the default [`LatinFold`] normalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the text-normalization strategy.
    pub fn with_normalizer(mut self, normalizer: impl TextNormalizer + 'static) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    /// Returns the active normalizer handle.
    pub fn normalizer(&self) -> SharedNormalizer {
        Arc::clone(&self.normalizer)
    }

    /// Normalizes event text with the active strategy.
    pub fn normalize_text(&self, text: &str) -> String {
        self.normalizer.normalize(text)
    }

    /// Applies the precedence rules; `None` means no action could be
    /// derived.
    pub fn resolve(&self, event: &Event, state: &ConversationState) -> Option<ResolvedAction> {
        if let Some(referral) = &event.referral {
            return Some(resolve_referral(referral));
        }
        if let Some(postback) = &event.postback {
            return Some(parse_payload(postback));
        }
        if let Some(reference) = event.optin_ref() {
            return Some(resolve_optin_ref(reference));
        }
        if let Some(quick_reply) = &event.quick_reply {
            return Some(parse_payload(quick_reply));
        }
        if let Some(pass_thread) = &event.pass_thread {
            return Some(resolve_pass_thread(pass_thread));
        }

        // Expectation rules apply only to bare free text.
        let text = event.text.as_deref()?;
        let normalized = self.normalizer.normalize(text);

        if let Some(keywords) = &state.expected_keywords
            && let Some(matched) = match_keywords(keywords, &normalized)
        {
            return Some(matched);
        }
        if let Some(expected) = &state.expected_action {
            return Some(ResolvedAction::new(&expected.action).with_data(expected.data.clone()));
        }
        None
    }
}

fn resolve_referral(referral: &Value) -> ResolvedAction {
    let reference = match referral {
        Value::Object(map) => map.get("ref").unwrap_or(referral),
        other => other,
    };
    parse_payload(reference)
}

/// Optin references arrive base64-encoded by convention; raw strings are
/// accepted as a fallback.
fn resolve_optin_ref(reference: &str) -> ResolvedAction {
    if let Ok(bytes) = BASE64.decode(reference)
        && let Ok(decoded) = String::from_utf8(bytes)
    {
        return parse_payload_str(&decoded);
    }
    parse_payload_str(reference)
}

fn resolve_pass_thread(payload: &Value) -> ResolvedAction {
    match payload.get("metadata") {
        Some(Value::String(s)) if !s.is_empty() => parse_payload_str(s),
        Some(v @ Value::Object(_)) => parse_payload(v),
        _ => ResolvedAction::new(PASS_THREAD_ACTION).with_data(json!({})),
    }
}

/// Exactly one keyword must match; zero or several is ambiguous input and
/// falls through to the next rule.
fn match_keywords(
    keywords: &[crate::state::KeywordExpectation],
    normalized_text: &str,
) -> Option<ResolvedAction> {
    let mut matched = None;
    for keyword in keywords {
        let re = match Regex::new(&keyword.match_pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(pattern = %keyword.match_pattern, error = %e, "Skipping invalid keyword pattern");
                continue;
            }
        };
        if re.is_match(normalized_text) {
            if matched.is_some() {
                debug!(text = %normalized_text, "Ambiguous keyword match, falling through");
                return None;
            }
            matched = Some(ResolvedAction::new(&keyword.action).with_data(keyword.data.clone()));
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Expectation, KeywordExpectation};

    fn state() -> ConversationState {
        ConversationState::new("u1")
    }

    #[test]
    fn postback_payload_resolves_to_its_action() {
        let ev = Event::postback("u1", json!({ "action": "/start", "data": { "n": 1 } }));
        let r = ActionResolver::new().resolve(&ev, &state()).unwrap();
        assert_eq!(r.action, "/start");
        assert_eq!(r.data, json!({ "n": 1 }));
    }

    #[test]
    fn quick_reply_outranks_expected_action() {
        let ev = Event::quick_reply("u1", "Buy", json!({ "action": "/buy", "data": { "sku": 7 } }));
        let mut st = state();
        st.expected_action = Some(Expectation::new("/fallback", Value::Null));
        let r = ActionResolver::new().resolve(&ev, &st).unwrap();
        assert_eq!(r.action, "/buy");
        assert_eq!(r.data, json!({ "sku": 7 }));
    }

    #[test]
    fn referral_outranks_postback() {
        let mut ev = Event::postback("u1", json!({ "action": "/from-postback" }));
        ev.referral = Some(json!({ "ref": { "action": "/from-referral" } }));
        let r = ActionResolver::new().resolve(&ev, &state()).unwrap();
        assert_eq!(r.action, "/from-referral");
    }

    #[test]
    fn optin_ref_decodes_base64_json() {
        let encoded = BASE64.encode("{\"action\":\"/welcome\",\"data\":{\"c\":1}}");
        let ev = Event::optin(encoded);
        let r = ActionResolver::new().resolve(&ev, &state()).unwrap();
        assert_eq!(r.action, "/welcome");
        assert_eq!(r.data, json!({ "c": 1 }));
    }

    #[test]
    fn optin_ref_falls_back_to_raw_string() {
        let ev = Event::optin("/plain-action");
        let r = ActionResolver::new().resolve(&ev, &state()).unwrap();
        assert_eq!(r.action, "/plain-action");
    }

    #[test]
    fn pass_thread_without_metadata_yields_sentinel() {
        let ev = Event::pass_thread("u1", json!({}));
        let r = ActionResolver::new().resolve(&ev, &state()).unwrap();
        assert_eq!(r.action, PASS_THREAD_ACTION);
        assert_eq!(r.data, json!({}));
    }

    #[test]
    fn pass_thread_metadata_is_parsed() {
        let ev = Event::pass_thread("u1", json!({ "metadata": "{\"action\":\"/handover\"}" }));
        let r = ActionResolver::new().resolve(&ev, &state()).unwrap();
        assert_eq!(r.action, "/handover");
    }

    #[test]
    fn single_keyword_match_wins_over_expected_action() {
        let ev = Event::text("u1", "Ano");
        let mut st = state();
        st.expected_keywords = Some(vec![
            KeywordExpectation::new("/yes", "^ano$"),
            KeywordExpectation::new("/no", "^ne$"),
        ]);
        st.expected_action = Some(Expectation::new("/fallback", Value::Null));
        let r = ActionResolver::new().resolve(&ev, &st).unwrap();
        assert_eq!(r.action, "/yes");
    }

    #[test]
    fn ambiguous_keyword_match_yields_nothing_from_keywords() {
        let ev = Event::text("u1", "foo");
        let mut st = state();
        st.expected_keywords = Some(vec![
            KeywordExpectation::new("/a", "^foo$"),
            KeywordExpectation::new("/b", "^foo$"),
        ]);
        let r = ActionResolver::new().resolve(&ev, &st);
        assert!(r.is_none());
    }

    #[test]
    fn ambiguous_keywords_still_fall_through_to_expected_action() {
        let ev = Event::text("u1", "foo");
        let mut st = state();
        st.expected_keywords = Some(vec![
            KeywordExpectation::new("/a", "^foo$"),
            KeywordExpectation::new("/b", "^foo$"),
        ]);
        st.expected_action = Some(Expectation::new("/fallback", json!({ "x": 1 })));
        let r = ActionResolver::new().resolve(&ev, &st).unwrap();
        assert_eq!(r.action, "/fallback");
    }

    #[test]
    fn expected_action_is_used_verbatim_for_bare_text() {
        let ev = Event::text("u1", "anything at all");
        let mut st = state();
        st.expected_action = Some(Expectation::new("/fallback", json!({ "x": 1 })));
        let r = ActionResolver::new().resolve(&ev, &st).unwrap();
        assert_eq!(r.action, "/fallback");
        assert_eq!(r.data, json!({ "x": 1 }));
    }

    #[test]
    fn plain_text_without_expectations_resolves_to_none() {
        let ev = Event::text("u1", "hello");
        assert!(ActionResolver::new().resolve(&ev, &state()).is_none());
    }
}

//! Read-only turn view handed to reducers.
//!
//! A [`Request`] is built once per dispatch from the raw event and the
//! loaded conversation state. Action resolution and text normalization run
//! at construction, so reducers see a consistent snapshot for the whole
//! turn.

use serde_json::{Value, json};

use trellis_core::{
    ActionResolver, ConversationState, Event, Expectation, Intent, make_absolute,
};

/// The immutable view of one turn: event, state snapshot, resolved action.
#[derive(Debug, Clone)]
pub struct Request {
    event: Event,
    state: ConversationState,
    action: Option<String>,
    action_data: Value,
    normalized_text: Option<String>,
    intents: Vec<Intent>,
    token: Option<String>,
}

impl Request {
    /// Builds the request, resolving the action and normalizing event text.
    pub fn new(event: Event, state: ConversationState, resolver: &ActionResolver) -> Self {
        let resolved = resolver.resolve(&event, &state);
        let (action, action_data) = match resolved {
            Some(r) if !r.action.is_empty() => (Some(make_absolute(&r.action, "/")), r.data),
            _ => (None, json!({})),
        };
        let normalized_text = event
            .text
            .as_deref()
            .map(|t| resolver.normalize_text(t))
            .filter(|t| !t.is_empty());
        Self {
            event,
            state,
            action,
            action_data,
            normalized_text,
            intents: Vec::new(),
            token: None,
        }
    }

    /// Attaches pre-resolved intents from a scoring provider.
    pub fn with_intents(mut self, intents: Vec<Intent>) -> Self {
        self.intents = intents;
        self
    }

    /// Attaches a conversation token from the security collaborator.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// The underlying event.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Sender identifier (the temporary reference id for optin turns).
    pub fn sender_id(&self) -> &str {
        &self.event.sender_id
    }

    /// Page the event arrived on.
    pub fn page_id(&self) -> Option<&str> {
        self.event.page_id.as_deref()
    }

    /// Platform event timestamp (ms).
    pub fn timestamp(&self) -> i64 {
        self.event.timestamp
    }

    /// Raw message text, empty when absent.
    pub fn text(&self) -> &str {
        self.event.text.as_deref().unwrap_or("")
    }

    /// Normalized message text used by free-text patterns.
    pub fn normalized_text(&self) -> Option<&str> {
        self.normalized_text.as_deref()
    }

    /// The resolved absolute action path for this turn, if any.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Data attached to the resolved action.
    pub fn action_data(&self) -> &Value {
        &self.action_data
    }

    /// Snapshot of the conversation state as loaded for this turn.
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Value of an application state variable.
    pub fn state_var(&self, key: &str) -> Option<&Value> {
        self.state.vars.get(key)
    }

    /// The expectation stored by a previous turn, if any.
    pub fn expected(&self) -> Option<&Expectation> {
        self.state.expected_action.as_ref()
    }

    /// Scored intents attached by a higher-level resolver.
    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    /// Conversation token, when a token issuer is configured.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `true` for plain message events (text or attachment).
    pub fn is_message(&self) -> bool {
        self.event.is_message()
    }

    /// `true` when the event carries free text.
    pub fn is_text(&self) -> bool {
        self.event.text.is_some()
    }

    /// `true` when the event carries a postback payload.
    pub fn is_postback(&self) -> bool {
        self.event.postback.is_some()
    }

    /// `true` when the event carries a quick-reply payload.
    pub fn is_quick_reply(&self) -> bool {
        self.event.is_quick_reply()
    }

    /// `true` for referral events.
    pub fn is_referral(&self) -> bool {
        self.event.referral.is_some()
    }

    /// `true` for optin first-contact events.
    pub fn is_optin(&self) -> bool {
        self.event.is_optin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_resolves_action_at_construction() {
        let ev = Event::postback("u1", json!({ "action": "/start", "data": { "n": 1 } }));
        let req = Request::new(ev, ConversationState::new("u1"), &ActionResolver::new());
        assert_eq!(req.action(), Some("/start"));
        assert_eq!(req.action_data(), &json!({ "n": 1 }));
        assert!(req.is_postback());
    }

    #[test]
    fn plain_text_request_has_no_action_but_normalized_text() {
        let ev = Event::text("u1", "Hello World");
        let req = Request::new(ev, ConversationState::new("u1"), &ActionResolver::new());
        assert_eq!(req.action(), None);
        assert_eq!(req.normalized_text(), Some("hello-world"));
        assert!(req.is_message());
    }

    #[test]
    fn relative_payload_actions_are_made_absolute() {
        let ev = Event::postback("u1", json!("start"));
        let req = Request::new(ev, ConversationState::new("u1"), &ActionResolver::new());
        assert_eq!(req.action(), Some("/start"));
    }
}

//! Mutation and output facade handed to reducers.
//!
//! A [`Response`] is a cheap-clone handle over shared turn-scoped
//! accumulators: queued outbound payloads, a state patch, and the
//! next-turn expectations. All clones (including those handed to nested
//! routers and postback sub-turns) write into the same accumulator, so the
//! processor can merge and flush the whole causal chain at once.
//!
//! Each clone carries its own `location`, which makes relative expectation
//! actions resolve against the scope that set them.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use trellis_core::{ConversationState, Expectation, KeywordExpectation, make_absolute};

#[derive(Debug, Default)]
struct ResponseInner {
    messages: Vec<Value>,
    state_patch: Map<String, Value>,
    expected_action: Option<Expectation>,
    expected_keywords: Option<Vec<KeywordExpectation>>,
    expectations_set: bool,
}

/// The turn's mutation/output builder.
#[derive(Debug, Clone, Default)]
pub struct Response {
    inner: Arc<Mutex<ResponseInner>>,
    location: String,
}

impl Response {
    /// Creates an empty response rooted at `/`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResponseInner::default())),
            location: "/".to_string(),
        }
    }

    /// Returns a handle sharing this accumulator but scoped to `location`.
    /// Used when delegating into a nested router.
    pub fn with_location(&self, location: &str) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            location: location.to_string(),
        }
    }

    /// The scope location of this handle.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Queues an arbitrary outbound payload.
    pub fn send(&self, payload: Value) {
        self.inner.lock().messages.push(payload);
    }

    /// Queues a plain text message.
    pub fn text(&self, text: impl Into<String>) {
        self.send(json!({ "message": { "text": text.into() } }));
    }

    /// Records a state variable patch (key-level last-writer-wins at merge).
    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().state_patch.insert(key.into(), value);
    }

    /// Sets the action to run if the next event is bare free text. Relative
    /// actions resolve against this handle's scope location.
    pub fn expected(&self, action: &str, data: Value) {
        let absolute = make_absolute(action, &self.location);
        let mut inner = self.inner.lock();
        inner.expected_action = Some(Expectation::new(absolute, data));
        inner.expectations_set = true;
    }

    /// Sets the keyword triggers checked before the `expected` fallback.
    /// Relative keyword actions resolve against this handle's scope.
    pub fn expected_keywords(&self, keywords: Vec<KeywordExpectation>) {
        let absolute = keywords
            .into_iter()
            .map(|mut k| {
                k.action = make_absolute(&k.action, &self.location);
                k
            })
            .collect();
        let mut inner = self.inner.lock();
        inner.expected_keywords = Some(absolute);
        inner.expectations_set = true;
    }

    /// Explicitly clears both expectation fields for the next turn.
    pub fn clear_expected(&self) {
        let mut inner = self.inner.lock();
        inner.expected_action = None;
        inner.expected_keywords = None;
        inner.expectations_set = true;
    }

    /// `true` when any handler set (or cleared) expectations this turn.
    pub fn expectations_set(&self) -> bool {
        self.inner.lock().expectations_set
    }

    /// Clones the queued outbound payloads.
    pub fn messages(&self) -> Vec<Value> {
        self.inner.lock().messages.clone()
    }

    /// Takes the queued outbound payloads, leaving the queue empty.
    pub fn drain_messages(&self) -> Vec<Value> {
        std::mem::take(&mut self.inner.lock().messages)
    }

    /// Applies the accumulated effects onto a copy of `base`: state patch at
    /// key level, then expectation fields when they were set this turn.
    pub fn apply_to(&self, base: &ConversationState) -> ConversationState {
        let inner = self.inner.lock();
        let mut merged = base.clone();
        for (key, value) in &inner.state_patch {
            merged.vars.insert(key.clone(), value.clone());
        }
        if inner.expectations_set {
            merged.expected_action = inner.expected_action.clone();
            merged.expected_keywords = inner.expected_keywords.clone();
        }
        merged
    }
}

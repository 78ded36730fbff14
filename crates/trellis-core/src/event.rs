//! Incoming event model.
//!
//! An [`Event`] is the raw input to one conversation turn: who sent it, when,
//! and which of the platform shapes it carries (free text, postback payload,
//! quick reply, referral, optin reference, attachments, thread hand-off).
//! Exactly one shape usually characterizes an event, though postback,
//! referral, optin and quick-reply payloads can legally co-occur; the
//! [`ActionResolver`](crate::resolver::ActionResolver) applies a fixed
//! precedence over them.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::Event;
//! use serde_json::json;
//!
//! let ev = Event::text("user-1", "hello there");
//! let ev = Event::postback("user-1", json!({ "action": "/start" }));
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One incoming chat event for a single sender.
///
/// Events are platform-agnostic: adapters translate wire payloads into this
/// shape before handing them to the processor. Channel bookkeeping frames
/// (echoes, read/delivery receipts, standby traffic) carry flags so the
/// processor can short-circuit them before any state I/O.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    /// Durable sender identifier. Empty for optin first-contact events.
    pub sender_id: String,
    /// Page / bot identity the event arrived on.
    pub page_id: Option<String>,
    /// Platform event timestamp in milliseconds.
    pub timestamp: i64,
    /// Free-text message content.
    pub text: Option<String>,
    /// Postback payload (button press or synthetic follow-up).
    pub postback: Option<Value>,
    /// Quick-reply payload attached to a message.
    pub quick_reply: Option<Value>,
    /// Referral payload (`{"ref": ...}` or a bare value).
    pub referral: Option<Value>,
    /// Optin payload carrying a first-contact reference.
    pub optin: Option<Value>,
    /// Message attachments.
    pub attachments: Vec<Value>,
    /// Thread hand-off payload (`{"metadata": ...}`).
    pub pass_thread: Option<Value>,
    /// Message echoed back by the platform (sent by the bot itself).
    pub is_echo: bool,
    /// Read receipt.
    pub is_read: bool,
    /// Delivery receipt.
    pub is_delivery: bool,
    /// Standby-channel traffic (another app owns the thread).
    pub is_standby: bool,
}

impl Event {
    /// Creates a free-text message event, stamped with the current time.
    pub fn text(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            timestamp: now_ms(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Creates a postback event carrying `payload`.
    pub fn postback(sender_id: impl Into<String>, payload: Value) -> Self {
        Self {
            sender_id: sender_id.into(),
            timestamp: now_ms(),
            postback: Some(payload),
            ..Self::default()
        }
    }

    /// Creates a message event with a quick-reply payload.
    pub fn quick_reply(sender_id: impl Into<String>, text: impl Into<String>, payload: Value) -> Self {
        Self {
            sender_id: sender_id.into(),
            timestamp: now_ms(),
            text: Some(text.into()),
            quick_reply: Some(payload),
            ..Self::default()
        }
    }

    /// Creates a referral event.
    pub fn referral(sender_id: impl Into<String>, payload: Value) -> Self {
        Self {
            sender_id: sender_id.into(),
            timestamp: now_ms(),
            referral: Some(payload),
            ..Self::default()
        }
    }

    /// Creates an optin first-contact event. Optins have no durable sender
    /// id yet; `reference` identifies the contact until the platform assigns
    /// one.
    pub fn optin(reference: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            optin: Some(serde_json::json!({ "ref": reference.into() })),
            ..Self::default()
        }
    }

    /// Creates an attachment-only message event.
    pub fn attachment(sender_id: impl Into<String>, attachment: Value) -> Self {
        Self {
            sender_id: sender_id.into(),
            timestamp: now_ms(),
            attachments: vec![attachment],
            ..Self::default()
        }
    }

    /// Creates a thread hand-off event.
    pub fn pass_thread(sender_id: impl Into<String>, payload: Value) -> Self {
        Self {
            sender_id: sender_id.into(),
            timestamp: now_ms(),
            pass_thread: Some(payload),
            ..Self::default()
        }
    }

    /// Overrides the event timestamp.
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attaches a page id.
    pub fn on_page(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    /// Marks the event as an echo frame.
    pub fn echo(mut self) -> Self {
        self.is_echo = true;
        self
    }

    /// Marks the event as standby-channel traffic.
    pub fn standby(mut self) -> Self {
        self.is_standby = true;
        self
    }

    /// Returns the optin reference string, when present.
    pub fn optin_ref(&self) -> Option<&str> {
        match self.optin.as_ref()? {
            Value::Object(map) => map.get("ref").and_then(Value::as_str),
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns `true` for optin first-contact events.
    pub fn is_optin(&self) -> bool {
        self.optin.is_some()
    }

    /// Returns `true` when the event carries a quick-reply payload.
    pub fn is_quick_reply(&self) -> bool {
        self.quick_reply.is_some()
    }

    /// Returns `true` when the event is a plain message (text or attachment)
    /// without stronger payload signals.
    pub fn is_message(&self) -> bool {
        (self.text.is_some() || !self.attachments.is_empty()) && !self.is_echo
    }

    /// User-initiated events are the shapes that clear stale expectations at
    /// the end of a turn: messages, postbacks, referrals and attachments.
    pub fn is_user_initiated(&self) -> bool {
        self.is_message() || self.postback.is_some() || self.referral.is_some()
    }

    /// Returns `false` for channel bookkeeping frames the processor must
    /// short-circuit before any state I/O: echoes, read and delivery
    /// receipts, and standby traffic.
    pub fn should_process(&self) -> bool {
        !(self.is_echo || self.is_read || self.is_delivery || self.is_standby)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_event_is_user_initiated() {
        let ev = Event::text("u1", "hi");
        assert!(ev.is_message());
        assert!(ev.is_user_initiated());
        assert!(ev.should_process());
    }

    #[test]
    fn echo_is_not_processed() {
        let ev = Event::text("u1", "hi").echo();
        assert!(!ev.should_process());
        assert!(!ev.is_message());
    }

    #[test]
    fn optin_has_no_sender_but_a_ref() {
        let ev = Event::optin("campaign-42");
        assert!(ev.sender_id.is_empty());
        assert_eq!(ev.optin_ref(), Some("campaign-42"));
        assert!(ev.is_optin());
    }

    #[test]
    fn serde_round_trip_uses_camel_case() {
        let ev = Event::postback("u1", json!({ "action": "/start" })).on_page("p1");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["senderId"], "u1");
        assert_eq!(v["pageId"], "p1");
        let back: Event = serde_json::from_value(v).unwrap();
        assert_eq!(back.sender_id, "u1");
        assert!(back.postback.is_some());
    }
}

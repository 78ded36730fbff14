//! Outbound delivery contracts.
//!
//! A [`SenderFactory`] mints one [`SenderHandle`] per turn. Payloads queue
//! in emission order through [`SenderHandle::send`]; [`SenderHandle::flush`]
//! resolves once the whole queue is delivered or failed and reports the
//! outcome, including the platform-resolved durable recipient id needed by
//! optin first-contact flows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use trellis_core::Event;

/// Outbound delivery failure.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The recipient blocked the bot or revoked messaging consent. Expected
    /// in normal operation, so it is kept out of warning-level logs.
    #[error("recipient rejected delivery")]
    Forbidden,

    /// Any other delivery failure.
    #[error("send failed: {0}")]
    Failed(String),
}

impl SendError {
    /// `true` for consent-revoked failures.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden)
    }

    /// Platform error code recorded into state diagnostics.
    pub fn code(&self) -> i64 {
        match self {
            Self::Forbidden => 403,
            Self::Failed(_) => 500,
        }
    }
}

/// Outcome of flushing one turn's outbound queue.
#[derive(Debug, Clone, Default)]
pub struct SendReport {
    /// Number of payloads delivered.
    pub sent: usize,
    /// Durable recipient id resolved by the platform, when known. Optin
    /// turns use this to replace the temporary one-time reference id.
    pub recipient_id: Option<String>,
    /// First delivery failure, if any.
    pub error: Option<SendError>,
}

/// Per-turn outbound channel.
#[async_trait]
pub trait SenderHandle: Send + Sync {
    /// Queues a payload for serial delivery.
    fn send(&self, payload: Value);

    /// Delivers the queue and reports the outcome.
    async fn flush(&self) -> SendReport;
}

/// Creates a sender for each incoming event.
pub trait SenderFactory: Send + Sync {
    /// Mints the turn's sender from the triggering event.
    fn create(&self, event: &Event) -> Arc<dyn SenderHandle>;
}

/// Test sender that records payloads instead of delivering them.
#[derive(Debug, Default)]
pub struct CollectingSender {
    payloads: Mutex<Vec<Value>>,
    recipient_id: Option<String>,
    fail_all: AtomicBool,
}

impl CollectingSender {
    /// Creates a collecting sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `recipient_id` as the durable recipient on flush.
    pub fn with_recipient(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: Some(recipient_id.into()),
            ..Self::default()
        }
    }

    /// Makes every flush report a failure.
    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    /// The payloads recorded so far.
    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().clone()
    }
}

#[async_trait]
impl SenderHandle for CollectingSender {
    fn send(&self, payload: Value) {
        self.payloads.lock().push(payload);
    }

    async fn flush(&self) -> SendReport {
        let sent = self.payloads.lock().len();
        if self.fail_all.load(Ordering::SeqCst) {
            return SendReport {
                sent: 0,
                recipient_id: None,
                error: Some(SendError::Failed("collector configured to fail".into())),
            };
        }
        SendReport {
            sent,
            recipient_id: self.recipient_id.clone(),
            error: None,
        }
    }
}

/// Factory producing [`CollectingSender`]s and retaining every handle it
/// minted, so tests can inspect what each turn sent.
#[derive(Debug, Default)]
pub struct CollectingSenderFactory {
    recipient_id: Option<String>,
    failing: bool,
    created: Mutex<Vec<Arc<CollectingSender>>>,
}

impl CollectingSenderFactory {
    /// Creates a factory minting plain collectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every minted sender will report this durable recipient id.
    pub fn with_recipient(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: Some(recipient_id.into()),
            ..Self::default()
        }
    }

    /// Every minted sender will fail its flush.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Handles minted so far, in creation order.
    pub fn created(&self) -> Vec<Arc<CollectingSender>> {
        self.created.lock().clone()
    }

    /// All payloads across every minted sender, in order.
    pub fn all_payloads(&self) -> Vec<Value> {
        self.created
            .lock()
            .iter()
            .flat_map(|s| s.payloads())
            .collect()
    }
}

impl SenderFactory for CollectingSenderFactory {
    fn create(&self, _event: &Event) -> Arc<dyn SenderHandle> {
        let sender = Arc::new(match &self.recipient_id {
            Some(id) => CollectingSender::with_recipient(id.clone()),
            None => CollectingSender::new(),
        });
        if self.failing {
            sender.fail_all();
        }
        self.created.lock().push(Arc::clone(&sender));
        sender
    }
}

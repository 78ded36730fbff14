//! Postback queue and deferred resolvers.
//!
//! A [`PostBack`] handle lets a reducer enqueue a synthetic follow-up action
//! without new external input. Actions are always recorded in absolute form:
//! handles rebased into nested scopes rewrite relative targets against their
//! scope location before queueing, so handlers can use scope-relative names.
//!
//! [`PostBack::wait`] supports sequencing a postback after an asynchronous
//! external confirmation: it returns a [`DeferredPostBack`] resolver bound
//! to the original sender/page context; the queue's drain loop waits until
//! every outstanding resolver settles (or is dropped).

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::debug;

use trellis_core::make_absolute;

/// One queued synthetic follow-up turn.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedPostBack {
    /// Absolute action path.
    pub action: String,
    /// Handler data.
    pub data: Value,
    /// Sender context captured when the postback was emitted.
    pub sender_id: String,
    /// Page context captured when the postback was emitted.
    pub page_id: Option<String>,
}

#[derive(Debug, Default)]
struct QueueInner {
    items: Mutex<VecDeque<QueuedPostBack>>,
    pending: AtomicUsize,
    notify: Notify,
}

/// The turn-scoped postback queue, drained by the processor.
#[derive(Debug, Clone, Default)]
pub struct PostBackQueue {
    inner: Arc<QueueInner>,
}

impl PostBackQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, item: QueuedPostBack) {
        self.inner.items.lock().push_back(item);
        self.inner.notify.notify_waiters();
    }

    fn add_pending(&self) {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn settle_pending(&self) {
        self.inner.pending.fetch_sub(1, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Pops the next queued postback, waiting for outstanding deferred
    /// resolvers. Returns `None` once the queue is empty and every deferred
    /// resolver has settled.
    pub async fn next(&self) -> Option<QueuedPostBack> {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(item) = self.inner.items.lock().pop_front() {
                return Some(item);
            }
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return None;
            }
            notified.await;
        }
    }

    /// Number of queued (not yet drained) postbacks.
    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }
}

/// The handle reducers use to emit postbacks.
#[derive(Debug, Clone)]
pub struct PostBack {
    queue: PostBackQueue,
    location: String,
    sender_id: String,
    page_id: Option<String>,
}

impl PostBack {
    /// Creates a handle rooted at `/` for the given sender context.
    pub fn new(queue: PostBackQueue, sender_id: impl Into<String>, page_id: Option<String>) -> Self {
        Self {
            queue,
            location: "/".to_string(),
            sender_id: sender_id.into(),
            page_id,
        }
    }

    /// Returns a handle scoped to `location`; relative actions sent through
    /// it resolve against that scope. Used at nested-router boundaries.
    pub fn rebased(&self, location: &str) -> Self {
        Self {
            location: location.to_string(),
            ..self.clone()
        }
    }

    /// Queues a follow-up action. Relative actions are made absolute against
    /// this handle's scope location.
    pub fn send(&self, action: &str, data: Value) {
        let absolute = make_absolute(action, &self.location);
        debug!(action = %absolute, "Queueing postback");
        self.queue.push(QueuedPostBack {
            action: absolute,
            data,
            sender_id: self.sender_id.clone(),
            page_id: self.page_id.clone(),
        });
    }

    /// Returns a deferred resolver bound to this handle's sender/page
    /// context. The turn's drain loop waits for it to settle.
    pub fn wait(&self) -> DeferredPostBack {
        self.queue.add_pending();
        DeferredPostBack {
            queue: self.queue.clone(),
            location: self.location.clone(),
            sender_id: self.sender_id.clone(),
            page_id: self.page_id.clone(),
            settled: false,
        }
    }

    /// The scope location of this handle.
    pub fn location(&self) -> &str {
        &self.location
    }
}

/// A one-shot resolver obtained from [`PostBack::wait`].
#[derive(Debug)]
pub struct DeferredPostBack {
    queue: PostBackQueue,
    location: String,
    sender_id: String,
    page_id: Option<String>,
    settled: bool,
}

impl DeferredPostBack {
    /// Triggers the deferred postback using the originally captured
    /// sender/page context.
    pub fn resolve(mut self, action: &str, data: Value) {
        let absolute = make_absolute(action, &self.location);
        self.queue.push(QueuedPostBack {
            action: absolute,
            data,
            sender_id: self.sender_id.clone(),
            page_id: self.page_id.clone(),
        });
        self.settled = true;
        self.queue.settle_pending();
    }
}

impl Drop for DeferredPostBack {
    fn drop(&mut self) {
        // A dropped resolver must not deadlock the drain loop.
        if !self.settled {
            self.queue.settle_pending();
        }
    }
}

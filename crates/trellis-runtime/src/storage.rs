//! Conversation state persistence.
//!
//! The [`StateStorage`] contract combines load-or-create with pessimistic
//! lock acquisition: a successful `get_or_create_and_lock` guarantees the
//! caller exclusive ownership of the sender's state until it is saved back
//! with the lock cleared. Stale locks expire after `timeout_ms`, so a
//! crashed turn cannot wedge a conversation forever.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::trace;

use trellis_core::{ConversationState, Event};

/// Storage-level failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The state is currently locked by another turn.
    #[error("conversation state is locked")]
    Locked,

    /// Backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence contract for per-sender conversation state.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Loads the sender's state, creating it from `default` on first
    /// contact, and acquires its lock. Fails with [`StorageError::Locked`]
    /// when another turn holds a lock younger than `timeout_ms`.
    async fn get_or_create_and_lock(
        &self,
        sender_id: &str,
        page_id: Option<&str>,
        default: ConversationState,
        timeout_ms: u64,
    ) -> StorageResult<ConversationState>;

    /// Persists the state. Saving with `lock == 0` releases the lock.
    async fn save_state(&self, state: ConversationState) -> StorageResult<()>;

    /// Post-load hook. Backends can enrich or migrate the freshly loaded
    /// state before the turn sees it; the default is a pass-through.
    async fn on_after_state_load(
        &self,
        _event: &Event,
        state: ConversationState,
    ) -> StorageResult<ConversationState> {
        Ok(state)
    }
}

type StateKey = (String, Option<String>);

/// In-process [`StateStorage`] backend.
///
/// Suitable for tests and single-instance deployments; lock expiry uses
/// wall-clock timestamps, matching what a database-backed implementation
/// would persist.
#[derive(Debug, Default)]
pub struct MemoryStateStorage {
    states: Mutex<HashMap<StateKey, ConversationState>>,
}

impl MemoryStateStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored state, for inspection.
    pub fn get(&self, sender_id: &str, page_id: Option<&str>) -> Option<ConversationState> {
        self.states
            .lock()
            .get(&(sender_id.to_string(), page_id.map(String::from)))
            .cloned()
    }

    /// Inserts a state directly, bypassing locking. Test setup helper.
    pub fn insert(&self, state: ConversationState) {
        let key = (state.sender_id.clone(), state.page_id.clone());
        self.states.lock().insert(key, state);
    }

    /// Number of stored conversations.
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    /// `true` when no conversation is stored.
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl StateStorage for MemoryStateStorage {
    async fn get_or_create_and_lock(
        &self,
        sender_id: &str,
        page_id: Option<&str>,
        default: ConversationState,
        timeout_ms: u64,
    ) -> StorageResult<ConversationState> {
        let key = (sender_id.to_string(), page_id.map(String::from));
        let now = now_ms();
        let mut states = self.states.lock();

        let entry = states.entry(key).or_insert_with(|| {
            trace!(sender_id, "Creating conversation state");
            let mut fresh = default;
            fresh.sender_id = sender_id.to_string();
            fresh.page_id = page_id.map(String::from);
            fresh
        });

        if entry.lock != 0 && now.saturating_sub(entry.lock) < timeout_ms {
            return Err(StorageError::Locked);
        }
        entry.lock = now;
        Ok(entry.clone())
    }

    async fn save_state(&self, state: ConversationState) -> StorageResult<()> {
        let key = (state.sender_id.clone(), state.page_id.clone());
        self.states.lock().insert(key, state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let storage = MemoryStateStorage::new();
        let state = storage
            .get_or_create_and_lock("u1", None, ConversationState::default(), 1000)
            .await
            .unwrap();
        assert_ne!(state.lock, 0);

        let second = storage
            .get_or_create_and_lock("u1", None, ConversationState::default(), 1000)
            .await;
        assert!(matches!(second, Err(StorageError::Locked)));

        let mut released = state;
        released.lock = 0;
        storage.save_state(released).await.unwrap();

        assert!(
            storage
                .get_or_create_and_lock("u1", None, ConversationState::default(), 1000)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn stale_locks_expire() {
        let storage = MemoryStateStorage::new();
        let mut stale = ConversationState::new("u1");
        stale.lock = 1;
        storage.insert(stale);

        let reacquired = storage
            .get_or_create_and_lock("u1", None, ConversationState::default(), 1000)
            .await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn first_contact_creates_state_with_identity() {
        let storage = MemoryStateStorage::new();
        let state = storage
            .get_or_create_and_lock("u9", Some("page-1"), ConversationState::default(), 1000)
            .await
            .unwrap();
        assert_eq!(state.sender_id, "u9");
        assert_eq!(state.page_id.as_deref(), Some("page-1"));
    }
}

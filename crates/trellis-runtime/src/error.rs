//! Runtime error types and turn outcomes.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that reject a turn outright.
///
/// Handler failures are deliberately absent: they are caught at the turn
/// boundary and reported through [`TurnStatus::Failed`], never as an `Err`.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The conversation lock could not be acquired within the retry budget.
    #[error("conversation is locked, turn rejected")]
    LockTimeout,

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result alias for processor operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// How a turn concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Dispatched, merged, persisted and flushed.
    Processed,
    /// Not a processable user event (echo, delivery receipt, malformed).
    Skipped,
    /// A redelivery of an already processed event.
    Deduplicated,
    /// A handler failed; the turn was aborted but the lock was released.
    Failed,
}

/// Per-turn summary returned by the processor.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    /// Outcome classification.
    pub status: TurnStatus,
    /// Number of outbound payloads delivered.
    pub sent: usize,
}

impl TurnSummary {
    pub(crate) fn new(status: TurnStatus) -> Self {
        Self { status, sent: 0 }
    }

    pub(crate) fn with_sent(status: TurnStatus, sent: usize) -> Self {
        Self { status, sent }
    }
}

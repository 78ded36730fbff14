//! Router error types.

use thiserror::Error;

/// An error raised by a reducer or exit handler.
///
/// Handler failures never crash the process; the processor catches them at
/// the turn boundary and converts the turn into a failure status.
#[derive(Debug, Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl HandlerError {
    /// Wraps any error value.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }

    /// Creates a handler error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

/// Errors surfaced by [`Router::reduce`](crate::router::Router::reduce).
#[derive(Debug, Error)]
pub enum RouterError {
    /// A reducer or exit handler failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Result alias for reducer and exit handlers.
pub type HandlerResult = Result<crate::signal::ReducerResult, HandlerError>;

/// Result alias for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

//! Turn processing and orchestration for Trellis bots.
//!
//! This crate ties a [`Router`](trellis_router::Router) to the outside
//! world: conversation state persistence with pessimistic locking
//! ([`storage`]), outbound delivery ([`sender`]), optional per-turn
//! collaborators ([`hooks`]), layered configuration ([`config`]) and
//! logging setup ([`logging`]). The [`Processor`] drives one event through
//! the whole turn lifecycle.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_runtime::{MemoryStateStorage, Processor, config, logging};
//!
//! let cfg = config::load_config()?;
//! logging::init_from_config(&cfg.logging);
//!
//! let processor = Processor::new(router, Arc::new(MemoryStateStorage::new()), senders)
//!     .with_config(cfg.processor);
//! let summary = processor.process_message(event).await?;
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod processor;
pub mod sender;
pub mod storage;

pub use config::{ConfigLoader, LoggingConfig, ProcessorConfig, TrellisConfig};
pub use error::{ProcessError, ProcessResult, TurnStatus, TurnSummary};
pub use hooks::{IntentResolver, TokenIssuer, UserLoader};
pub use logging::LoggingBuilder;
pub use processor::Processor;
pub use sender::{
    CollectingSender, CollectingSenderFactory, SendError, SendReport, SenderFactory, SenderHandle,
};
pub use storage::{MemoryStateStorage, StateStorage, StorageError, StorageResult};

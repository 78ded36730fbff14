//! # Trellis
//!
//! A conversational bot routing framework: cascading dispatch over named
//! action paths, per-sender conversation state, and a turn controller that
//! keeps the whole pipeline exactly-once per event.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐     ┌───────────┐     ┌────────────────────────────────┐
//! │ Adapter │────▶│ Processor │────▶│ Router  /start ─▶ handler      │
//! │ (event) │     │ lock,dedup│     │         /faq/* ─▶ sub-router   │──▶ sender
//! └─────────┘     │ merge,save│────▶│         /*     ─▶ fallback     │
//!                 └───────────┘     └────────────────────────────────┘
//! ```
//!
//! - **Events** ([`core`]): platform-agnostic input, one per turn
//! - **Resolution** ([`core`]): payload precedence ladder turning an event
//!   into an absolute action path
//! - **Dispatch** ([`router`]): ordered routes, OR-groups, nested routers,
//!   exit points, postback queue
//! - **Orchestration** ([`runtime`]): state locking, dedup, merge/persist,
//!   outbound flush, configuration and logging
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use trellis::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut router = Router::new();
//!     router.add(Route::new("/start").handler(|_req, res, _pb| async move {
//!         res.text("Hello!");
//!         Router::end()
//!     }));
//!     router.add(Route::any().handler(|_req, res, pb| async move {
//!         res.text("Let me start over.");
//!         pb.send("/start", json!({}));
//!         Router::end()
//!     }));
//!
//!     let processor = Processor::new(
//!         router,
//!         Arc::new(MemoryStateStorage::new()),
//!         my_sender_factory,
//!     );
//!     processor.process_message(Event::text("user-1", "hi")).await?;
//!     Ok(())
//! }
//! ```

pub use trellis_core as core;
pub use trellis_router as router;
pub use trellis_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    // Event and state model
    pub use trellis_core::{
        ActionResolver, ConversationState, Event, Expectation, Intent, KeywordExpectation,
        ResolvedAction,
    };

    // Dispatch
    pub use trellis_router::{
        ExitSignal, HandlerError, HandlerResult, PostBack, Reducer, ReducerResult, Request,
        Response, Route, RouteOutcome, Router,
    };

    // Orchestration
    pub use trellis_runtime::{
        MemoryStateStorage, ProcessError, Processor, SendReport, SenderFactory, SenderHandle,
        StateStorage, TurnStatus, TurnSummary,
    };
}

//! Dispatch control signals.
//!
//! Every reducer resolves to one of four signals. The router's cascade is
//! driven entirely by them:
//!
//! - [`Continue`](ReducerResult::Continue) — proceed to the next reducer in
//!   the same route; from the last reducer, fall through to the next route.
//! - [`Break`](ReducerResult::Break) — this route does not match; try the
//!   next registered route.
//! - [`End`](ReducerResult::End) — the turn is handled, stop all processing.
//! - [`Exit`](ReducerResult::Exit) — hand control to a named exit point
//!   somewhere up the router chain.

use serde_json::{Value, json};

/// A named escape hatch signal, resolved against route exit-point maps as it
/// bubbles outward.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    /// Exit point name (or an absolute action path for redirects).
    pub name: String,
    /// Data handed to the exit handler.
    pub data: Value,
}

impl ExitSignal {
    /// Creates an exit signal.
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// The value a reducer resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum ReducerResult {
    /// Proceed to the next reducer in this route.
    Continue,
    /// This route does not match; try the next top-level route.
    Break,
    /// The turn is handled; stop all processing.
    End,
    /// Jump to a named exit point.
    Exit(ExitSignal),
}

impl ReducerResult {
    /// Builds an exit signal with data.
    pub fn exit(name: impl Into<String>, data: Value) -> Self {
        Self::Exit(ExitSignal::new(name, data))
    }

    /// Builds an exit signal with empty data.
    pub fn exit_empty(name: impl Into<String>) -> Self {
        Self::exit(name, json!({}))
    }
}

/// The final result of a `reduce` call.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// No route consumed the request — as a nested reducer this router did
    /// not handle it; the caller's next reducer should try.
    Continue,
    /// A route handled the request.
    End,
    /// An exit signal that no exit point along the chain consumed.
    Exit(ExitSignal),
}

//! Cascading dispatch for conversational bots.
//!
//! This crate turns a resolved turn (a [`Request`]) into effects (a
//! [`Response`] accumulator and a [`PostBack`] queue) by walking a
//! [`Router`]'s routes in registration order. Control flow between
//! reducers is expressed with [`ReducerResult`] signals; structured jumps
//! across nesting levels use exit points.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use trellis_router::{Route, Router};
//!
//! let mut router = Router::new();
//! router.add(Route::new("/start").handler(|_req, res, _pb| async move {
//!     res.text("Hi there!");
//!     res.expected("name", json!({}));
//!     Router::end()
//! }));
//! router.add(Route::any().handler(|_req, res, pb| async move {
//!     res.text("Let's start over.");
//!     pb.send("/start", json!({}));
//!     Router::end()
//! }));
//! ```

pub mod error;
pub mod postback;
pub mod request;
pub mod response;
pub mod router;
pub mod signal;

pub use error::{HandlerError, HandlerResult, RouterError, RouterResult};
pub use postback::{DeferredPostBack, PostBack, PostBackQueue, QueuedPostBack};
pub use request::Request;
pub use response::Response;
pub use router::{
    ActionListener, BoxedExitHandler, BoxedHandler, Reducer, Route, Router, into_exit_handler,
    into_handler,
};
pub use signal::{ExitSignal, ReducerResult, RouteOutcome};

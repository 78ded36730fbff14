//! # Trellis Core
//!
//! Foundation layer of the Trellis conversational-bot routing engine.
//!
//! This crate holds the pieces with no dependencies on dispatch or
//! orchestration:
//!
//! - **Event model**: platform-agnostic incoming events ([`Event`])
//! - **Conversation state**: the persisted per-sender document with its two
//!   reserved expectation fields ([`ConversationState`])
//! - **Payload parsing**: permissive action extraction ([`parse_payload`])
//! - **Path utilities**: normalization, absolutization and compiled route
//!   path specs ([`path`], [`PathSpec`])
//! - **Text normalization**: the pluggable matching-form strategy
//!   ([`TextNormalizer`], [`LatinFold`])
//! - **Action resolution**: the fixed precedence ladder deriving "what the
//!   user is trying to do" ([`ActionResolver`])
//!
//! Higher layers build on this: `trellis-router` implements the cascading
//! dispatch engine, `trellis-runtime` the turn processor.

pub mod event;
pub mod normalize;
pub mod path;
pub mod payload;
pub mod resolver;
pub mod state;

pub use event::Event;
pub use normalize::{LatinFold, SharedNormalizer, TextNormalizer};
pub use path::{PathSpec, WILDCARD, action_matches, make_absolute, normalize as normalize_path};
pub use payload::{ResolvedAction, parse_payload, parse_payload_str};
pub use resolver::{ActionResolver, Intent, PASS_THREAD_ACTION};
pub use state::{ConversationState, DEDUP_WINDOW, Expectation, KeywordExpectation};

//! Optional per-turn collaborators.
//!
//! Each hook is a seam the processor consults when configured and skips
//! entirely when absent. None of them may block a turn: failures degrade to
//! the unhooked behavior.

use async_trait::async_trait;
use serde_json::Value;

use trellis_core::Intent;

/// Loads a user profile attached to the conversation state on first sight.
#[async_trait]
pub trait UserLoader: Send + Sync {
    /// Returns the profile document, or `None` when unavailable.
    async fn load_user(&self, sender_id: &str, page_id: Option<&str>) -> Option<Value>;
}

/// Issues per-conversation security tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Returns the conversation's token, minting one on first use.
    async fn get_or_create_token(&self, sender_id: &str, page_id: Option<&str>) -> Option<String>;
}

/// Scores free text against an intent model.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    /// Returns scored intents, best first. Empty when nothing matched.
    async fn resolve(&self, text: &str) -> Vec<Intent>;
}

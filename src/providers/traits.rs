//! Collaborator traits.
//!
//! Each external service the responder talks to sits behind one narrow
//! trait, so HTTP clients, retry decorators and test doubles are
//! interchangeable.

use async_trait::async_trait;

use crate::Result;
use crate::types::{AudioClip, ChatMessage, ReplyPrompt};

// ============================================================================
// Reply generation
// ============================================================================

/// Produces reply text for a viewer comment.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generator name for logging/debugging.
    fn name(&self) -> &str;

    /// Generate a reply. An empty reply is reported as `EmptyResponse`.
    async fn generate(&self, prompt: &ReplyPrompt) -> Result<String>;
}

// ============================================================================
// Speech synthesis
// ============================================================================

/// Turns reply text into an audio payload.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizer name for logging/debugging.
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}

// ============================================================================
// Chat source
// ============================================================================

/// A feed of viewer comments, polled in batches.
#[async_trait]
pub trait ChatSource: Send + Sync {
    fn name(&self) -> &str;

    /// Messages that arrived since the previous poll, oldest first.
    async fn poll(&self) -> Result<Vec<ChatMessage>>;
}

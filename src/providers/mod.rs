//! External collaborators: reply generation, speech synthesis, live chat.
//!
//! Each concern has a trait in [`traits`] and one HTTP implementation:
//!
//! | Trait | Client | Service |
//! |-------|--------|---------|
//! | [`ReplyGenerator`] | [`GeminiClient`] | Gemini `generateContent` |
//! | [`SpeechSynthesizer`] | [`AivisClient`] | AIVIS / VOICEVOX engine |
//! | [`ChatSource`] | [`YouTubeChatClient`] | YouTube live chat |
//!
//! [`RetryingGenerator`] and [`RetryingSynthesizer`] add retry on
//! transient errors.

pub mod aivis;
pub mod gemini;
pub mod retry;
pub mod traits;
pub mod youtube;

pub use aivis::AivisClient;
pub use gemini::{GeminiClient, Persona};
pub use retry::{RetryConfig, RetryingGenerator, RetryingSynthesizer};
pub use traits::{ChatSource, ReplyGenerator, SpeechSynthesizer};
pub use youtube::YouTubeChatClient;

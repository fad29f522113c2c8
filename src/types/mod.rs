//! Public types shared across marionette components.

mod audio;
mod chat;

pub use audio::AudioClip;
pub use chat::{ChatMessage, ReplyPrompt};

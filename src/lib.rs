//! Marionette - virtual streamer runtime
//!
//! Reads a live chat, generates a reply for each comment, synthesizes the
//! reply as speech, and plays it over a talking avatar clip. Between
//! replies the avatar cycles through a configurable pattern of idle clips.
//!
//! The moving parts:
//!
//! - [`cache::CacheStore`]: TTL caches for replies and audio, persisted
//!   with a backup snapshot so a crash mid-write never loses the old state.
//! - [`playback::PlaybackSynchronizer`]: the single talking-session slot;
//!   a new session always cancels the old one first.
//! - [`video::VideoScheduler`]: asset metadata, the idle-pattern cursor,
//!   talking clip selection and the idle loop.
//! - [`responder::Responder`]: the per-comment pipeline.
//! - [`streamer::Streamer`]: wires everything from [`Config`] and runs
//!   until shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use marionette::{Config, Secrets, Streamer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> marionette::Result<()> {
//!     let config = Config::load(None)?;
//!     let secrets = Secrets::load()?;
//!     let streamer =
//!         tokio::task::spawn_blocking(move || Streamer::from_config(&config, &secrets))
//!             .await
//!             .expect("streamer construction panicked")?;
//!
//!     let shutdown = CancellationToken::new();
//!     streamer.run(shutdown).await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod playback;
pub mod providers;
pub mod responder;
pub mod streamer;
pub mod telemetry;
pub mod types;
pub mod video;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheStore};
pub use config::{Config, Secrets};
pub use error::{MarionetteError, Result};
pub use playback::{PlaybackEvent, PlaybackStatus, PlaybackSynchronizer};
pub use providers::{
    ChatSource, ReplyGenerator, RetryConfig, RetryingGenerator, RetryingSynthesizer,
    SpeechSynthesizer,
};
pub use responder::{ProcessedComment, Responder};
pub use streamer::Streamer;
pub use types::{AudioClip, ChatMessage, ReplyPrompt};
pub use video::{IdleStep, VideoAsset, VideoCatalog, VideoScheduler};

/// Crate version.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

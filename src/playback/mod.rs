//! Audio/video playback synchronization.
//!
//! At most one talking session is active at a time. Installing a new one
//! cancels the previous session and waits for its task to finish before the
//! new media is published.

mod session;
mod sync;

pub use session::{PlaybackEvent, PlaybackSession, PlaybackStatus};
pub use sync::{PlaybackSynchronizer, PlaybackWatch};

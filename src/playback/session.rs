//! Playback session state.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::AudioClip;
use crate::video::{AssetKind, VideoAsset};
use crate::{MarionetteError, Result};

/// The media installed in the playback slot.
#[derive(Debug)]
pub struct PlaybackSession {
    pub video: VideoAsset,
    pub audio: AudioClip,
    pub started_at: Instant,
}

impl PlaybackSession {
    pub(crate) fn start(video: VideoAsset, audio: AudioClip) -> Result<Self> {
        if audio.is_empty() {
            return Err(MarionetteError::Playback(format!(
                "empty audio for {}",
                video.filename
            )));
        }
        if let AssetKind::Video { fps, .. } = video.kind {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(MarionetteError::Playback(format!(
                    "invalid frame rate {fps} for {}",
                    video.filename
                )));
            }
        }
        Ok(Self {
            video,
            audio,
            started_at: Instant::now(),
        })
    }

    /// How long the session holds the slot.
    pub fn duration(&self) -> Duration {
        self.video.duration()
    }
}

/// Snapshot returned by
/// [`PlaybackSynchronizer::get_playback_status`](super::PlaybackSynchronizer::get_playback_status).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub current_video: Option<PathBuf>,
    pub has_audio: bool,
    pub elapsed: Duration,
}

/// Lifecycle notifications, in order, for each session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { video: PathBuf },
    Finished { video: PathBuf, cancelled: bool },
}

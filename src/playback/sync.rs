//! Single-slot playback synchronizer.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::session::{PlaybackEvent, PlaybackSession, PlaybackStatus};
use crate::telemetry;
use crate::types::AudioClip;
use crate::video::VideoAsset;

const EVENT_BUFFER: usize = 32;

/// Receiver for the active session, `None` while idle.
pub type PlaybackWatch = watch::Receiver<Option<Arc<PlaybackSession>>>;

struct ActiveSession {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the playback slot.
///
/// `sync_media` calls are serialized on the slot lock: the previous session
/// is cancelled and fully wound down before the next one is installed, so
/// observers never see two sessions overlap.
pub struct PlaybackSynchronizer {
    slot: Mutex<Option<ActiveSession>>,
    state: Arc<watch::Sender<Option<Arc<PlaybackSession>>>>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl Default for PlaybackSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSynchronizer {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            slot: Mutex::new(None),
            state: Arc::new(state),
            events,
        }
    }

    /// Replace whatever is playing with `video` and `audio`.
    ///
    /// Returns `false` if the new session could not be installed. The
    /// previous session is cancelled either way.
    pub async fn sync_media(&self, video: VideoAsset, audio: AudioClip) -> bool {
        let mut slot = self.slot.lock().await;
        self.cancel_active(&mut slot).await;

        let session = match PlaybackSession::start(video, audio) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                error!(error = %e, "error in sync_media");
                return false;
            }
        };

        let video = session.video.path.clone();
        debug!(
            video = %video.display(),
            audio_bytes = session.audio.len(),
            duration_ms = session.duration().as_millis() as u64,
            "playback started"
        );
        self.state.send_replace(Some(Arc::clone(&session)));
        let _ = self.events.send(PlaybackEvent::Started { video });

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(play(
            session,
            cancel.clone(),
            Arc::clone(&self.state),
            self.events.clone(),
        ));
        *slot = Some(ActiveSession { cancel, handle });
        true
    }

    /// Current slot contents. Never blocks.
    pub fn get_playback_status(&self) -> PlaybackStatus {
        match self.state.borrow().as_ref() {
            Some(session) => PlaybackStatus {
                is_playing: true,
                current_video: Some(session.video.path.clone()),
                has_audio: !session.audio.is_empty(),
                elapsed: session.started_at.elapsed(),
            },
            None => PlaybackStatus::default(),
        }
    }

    /// Watch the active session.
    pub fn subscribe(&self) -> PlaybackWatch {
        self.state.subscribe()
    }

    /// Receive lifecycle events for sessions started after this call.
    pub fn events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Cancel the active session, if any, and wait for it to wind down.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        self.cancel_active(&mut slot).await;
    }

    /// Stop playback at shutdown. Safe to call more than once.
    pub async fn cleanup(&self) {
        self.stop().await;
        info!("playback synchronizer cleaned up");
    }

    /// Cancel and join the session in `slot`.
    ///
    /// The session stays in the slot until its task has been joined, so a
    /// caller dropped mid-wait leaves it for the next caller to finish.
    async fn cancel_active(&self, slot: &mut Option<ActiveSession>) {
        let Some(active) = slot.as_mut() else {
            return;
        };
        active.cancel.cancel();
        let joined = (&mut active.handle).await;
        *slot = None;
        if let Err(e) = joined {
            error!(error = %e, "playback task failed");
            self.state.send_replace(None);
        }
    }
}

async fn play(
    session: Arc<PlaybackSession>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<Option<Arc<PlaybackSession>>>>,
    events: broadcast::Sender<PlaybackEvent>,
) {
    let cancelled = tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(session.duration()) => false,
    };

    // a newer session may already own the slot
    state.send_if_modified(|current| {
        let ours = matches!(current, Some(active) if Arc::ptr_eq(active, &session));
        if ours {
            *current = None;
        }
        ours
    });
    let video = session.video.path.clone();
    let outcome = if cancelled {
        info!(video = %video.display(), "playback cancelled");
        "cancelled"
    } else {
        debug!(video = %video.display(), "playback finished");
        "completed"
    };
    metrics::counter!(telemetry::PLAYBACK_SESSIONS_TOTAL, "outcome" => outcome).increment(1);
    let _ = events.send(PlaybackEvent::Finished { video, cancelled });
}

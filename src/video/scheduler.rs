//! Idle/talking video scheduler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::asset::{self, AssetProbe, VideoAsset};
use super::catalog::VideoCatalog;
use crate::playback::PlaybackWatch;
use crate::telemetry;
use crate::{MarionetteError, Result};

/// Replies shorter than this many characters get the short talking clip.
pub const SHORT_REPLY_CHARS: usize = 50;
/// Replies shorter than this (and not short) get the medium clip.
pub const MEDIUM_REPLY_CHARS: usize = 100;
/// How long the idle loop holds a step it could not play, or a still image.
pub const IDLE_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Position in the idle pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerCursor {
    pub pattern_index: usize,
    /// Plays of the current step already completed.
    pub repeats_done: u32,
}

/// One idle clip chosen by [`VideoScheduler::next_idle_step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleStep {
    pub key: String,
    pub path: PathBuf,
    /// This play finished its pattern step; the next call moves on.
    pub boundary: bool,
}

/// Chooses what the avatar shows.
///
/// The idle cursor is only advanced by [`next_idle_step`](Self::next_idle_step),
/// normally from the single idle loop task.
pub struct VideoScheduler {
    videos_dir: PathBuf,
    catalog: VideoCatalog,
    probe: Arc<dyn AssetProbe>,
    assets: Cache<String, VideoAsset>,
    cursor: Mutex<SchedulerCursor>,
    fallback: IdleStep,
    stop: CancellationToken,
    running: AtomicBool,
    current_idle: watch::Sender<Option<IdleStep>>,
}

impl VideoScheduler {
    /// Build a scheduler over `videos_dir` and preload every catalog asset.
    ///
    /// Preloading probes each asset on the calling thread.
    pub fn new(
        videos_dir: impl Into<PathBuf>,
        catalog: VideoCatalog,
        probe: Arc<dyn AssetProbe>,
    ) -> Result<Self> {
        let videos_dir = videos_dir.into();
        let (key, filename) = catalog.fallback_idle().ok_or_else(|| {
            MarionetteError::Configuration("video catalog has no idle clips".to_string())
        })?;
        let fallback = IdleStep {
            key: key.to_string(),
            path: videos_dir.join(filename),
            boundary: true,
        };
        let (current_idle, _) = watch::channel(None);

        let scheduler = Self {
            videos_dir,
            catalog,
            probe,
            assets: Cache::builder().build(),
            cursor: Mutex::new(SchedulerCursor::default()),
            fallback,
            stop: CancellationToken::new(),
            running: AtomicBool::new(false),
            current_idle,
        };
        scheduler.preload();
        Ok(scheduler)
    }

    /// Load the catalog from `catalog_path`, then build as [`new`](Self::new).
    pub fn from_catalog_file(
        videos_dir: impl Into<PathBuf>,
        catalog_path: &Path,
        probe: Arc<dyn AssetProbe>,
    ) -> Result<Self> {
        let catalog = VideoCatalog::load(catalog_path)?;
        Self::new(videos_dir, catalog, probe)
    }

    pub fn catalog(&self) -> &VideoCatalog {
        &self.catalog
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    /// Resolve every catalog file that exists. Returns how many resolved.
    ///
    /// Blocking; see [`prepare`](Self::prepare) for the async path.
    pub fn preload(&self) -> usize {
        let mut loaded = 0;
        for filename in self.catalog.filenames() {
            let path = self.videos_dir.join(filename);
            if !path.exists() {
                warn!(path = %path.display(), "catalog video missing, skipping preload");
                continue;
            }
            if let Some(asset) = self.resolve_asset(&path) {
                self.assets.insert(filename.to_string(), asset);
                loaded += 1;
            }
        }
        info!(count = loaded, "preloaded videos");
        loaded
    }

    /// Resolve metadata for `path`. Failures are logged and yield `None`.
    pub fn resolve_asset(&self, path: &Path) -> Option<VideoAsset> {
        match asset::resolve(path, self.probe.as_ref()) {
            Ok(asset) => Some(asset),
            Err(e) => {
                error!(path = %path.display(), error = %e, "error loading video info");
                None
            }
        }
    }

    /// Memoized asset for a filename, if preloaded or prepared.
    pub fn cached_asset(&self, filename: &str) -> Option<VideoAsset> {
        self.assets.get(filename)
    }

    /// Make `path` ready to play, resolving its metadata on first use.
    pub async fn prepare(&self, path: &Path) -> Option<VideoAsset> {
        if !path.exists() {
            error!(path = %path.display(), "video not found");
            return None;
        }
        let filename = path.file_name()?.to_string_lossy().into_owned();
        if let Some(asset) = self.assets.get(&filename) {
            return Some(asset.at_path(path));
        }

        let probe = Arc::clone(&self.probe);
        let owned = path.to_path_buf();
        match tokio::task::spawn_blocking(move || asset::resolve(&owned, probe.as_ref())).await {
            Ok(Ok(asset)) => {
                self.assets.insert(filename, asset.clone());
                Some(asset)
            }
            Ok(Err(e)) => {
                error!(path = %path.display(), error = %e, "error preparing video");
                None
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "video probe task failed");
                None
            }
        }
    }

    /// Advance the idle cursor and return the clip to show.
    ///
    /// Each pattern step is played `repeat_count` times (zero counts as one)
    /// before moving on; the pattern wraps. On any failure the fallback idle
    /// clip is returned and the cursor still moves past the bad step.
    pub fn next_idle_step(&self) -> IdleStep {
        match self.advance_cursor() {
            Ok(step) => step,
            Err(e) => {
                error!(error = %e, fallback = %self.fallback.key, "error getting next idle video");
                self.fallback.clone()
            }
        }
    }

    fn advance_cursor(&self) -> Result<IdleStep> {
        let pattern = &self.catalog.idle_pattern;
        let (key, boundary) = {
            let mut cursor = self
                .cursor
                .lock()
                .map_err(|e| MarionetteError::Playback(format!("idle cursor poisoned: {e}")))?;
            let index = cursor.pattern_index % pattern.len().max(1);
            let step = pattern.get(index).ok_or_else(|| {
                MarionetteError::Configuration("idle pattern is empty".to_string())
            })?;
            let repeat = step.repeat_count.max(1);

            cursor.repeats_done += 1;
            let boundary = cursor.repeats_done >= repeat;
            if boundary {
                cursor.repeats_done = 0;
                cursor.pattern_index = (index + 1) % pattern.len();
            }
            (step.video_key.clone(), boundary)
        };

        let filename = self.catalog.video_files.idle.get(&key).ok_or_else(|| {
            MarionetteError::Configuration(format!("unknown idle video key {key:?}"))
        })?;
        Ok(IdleStep {
            path: self.videos_dir.join(filename),
            key,
            boundary,
        })
    }

    /// Current idle cursor.
    pub fn cursor(&self) -> SchedulerCursor {
        self.cursor.lock().map(|c| *c).unwrap_or_default()
    }

    /// Talking clip for a reply of `response_len` characters.
    ///
    /// `< 50` short, `< 100` medium, otherwise long. Missing tiers fall back
    /// to the first clip.
    pub fn select_talking_clip(&self, response_len: usize) -> PathBuf {
        let tier = if response_len < SHORT_REPLY_CHARS {
            0
        } else if response_len < MEDIUM_REPLY_CHARS {
            1
        } else {
            2
        };
        let talking = &self.catalog.video_files.talking;
        let filename = talking.get(tier).or_else(|| {
            warn!(tier, configured = talking.len(), "talking tier missing, using first clip");
            talking.first()
        });
        match filename {
            Some(f) => self.videos_dir.join(f),
            None => self.fallback.path.clone(),
        }
    }

    /// Show idle clips until [`stop`](Self::stop) is called.
    ///
    /// While a talking session is active in `talking`, no idle step is taken;
    /// a talking session starting mid-clip ends that clip early.
    pub async fn run_idle_loop(&self, mut talking: Option<PlaybackWatch>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("idle loop already running");
            return;
        }
        info!("idle loop started");

        loop {
            if let Some(rx) = talking.as_mut() {
                let closed = tokio::select! {
                    _ = self.stop.cancelled() => break,
                    res = rx.wait_for(|session| session.is_none()) => res.is_err(),
                };
                if closed {
                    talking = None;
                }
            }
            if self.stop.is_cancelled() {
                break;
            }

            let step = self.next_idle_step();
            metrics::counter!(telemetry::IDLE_STEPS_TOTAL).increment(1);
            let hold = match self.prepare(&step.path).await {
                Some(asset) if !asset.duration().is_zero() => asset.duration(),
                Some(_) => IDLE_RETRY_BACKOFF,
                None => {
                    warn!(key = %step.key, "idle clip unavailable, backing off");
                    IDLE_RETRY_BACKOFF
                }
            };
            debug!(
                key = %step.key,
                boundary = step.boundary,
                hold_ms = hold.as_millis() as u64,
                "idle step"
            );
            self.current_idle.send_replace(Some(step));

            let preempt = async {
                match talking.as_mut() {
                    Some(rx) => {
                        if rx.wait_for(|session| session.is_some()).await.is_err() {
                            std::future::pending::<()>().await;
                        }
                    }
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(hold) => {}
                _ = preempt => {
                self.current_idle.send_replace(None);
                debug!("idle clip preempted by talking session");
            }
            }
        }

        self.current_idle.send_replace(None);
        self.running.store(false, Ordering::SeqCst);
        info!("idle loop stopped");
    }

    /// Ask the idle loop to exit. It does not restart afterwards.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The idle clip on screen, `None` while the loop is not running or a
    /// talking session has the screen.
    pub fn current_idle(&self) -> Option<IdleStep> {
        self.current_idle.borrow().clone()
    }

    pub fn subscribe_idle(&self) -> watch::Receiver<Option<IdleStep>> {
        self.current_idle.subscribe()
    }

    /// Whether every idle and talking file in the catalog exists on disk.
    pub fn check_status(&self) -> bool {
        let missing: Vec<&str> = self
            .catalog
            .filenames()
            .into_iter()
            .filter(|f| !self.videos_dir.join(f).is_file())
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "catalog videos missing");
        }
        missing.is_empty()
    }
}

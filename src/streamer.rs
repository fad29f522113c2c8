//! The running service: idle loop, chat monitoring and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::config::{Config, Secrets};
use crate::playback::PlaybackSynchronizer;
use crate::providers::{
    AivisClient, ChatSource, GeminiClient, Persona, RetryingGenerator, RetryingSynthesizer,
    YouTubeChatClient,
};
use crate::responder::Responder;
use crate::video::{FfprobeProbe, VideoScheduler};
use crate::Result;

/// Characters of a comment shown in the processed-comment log line.
const LOG_PREVIEW_CHARS: usize = 30;

/// Wires the components together and drives them until shutdown.
pub struct Streamer {
    chat: Arc<dyn ChatSource>,
    responder: Responder,
    scheduler: Arc<VideoScheduler>,
    playback: Arc<PlaybackSynchronizer>,
    poll_interval: Duration,
}

impl Streamer {
    pub fn new(
        chat: Arc<dyn ChatSource>,
        responder: Responder,
        scheduler: Arc<VideoScheduler>,
        playback: Arc<PlaybackSynchronizer>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chat,
            responder,
            scheduler,
            playback,
            poll_interval,
        }
    }

    /// Build every component from configuration.
    ///
    /// Fails if the directory layout cannot be created or the video catalog
    /// is missing or invalid.
    ///
    /// Blocking: catalog assets are probed synchronously (ffprobe runs once
    /// per video). Call it from `spawn_blocking` inside a runtime.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        config.ensure_directories()?;

        let scheduler = Arc::new(VideoScheduler::from_catalog_file(
            config.videos_dir(),
            &config.video_catalog_path(),
            Arc::new(FfprobeProbe::new()),
        )?);
        if !scheduler.check_status() {
            warn!(dir = %config.videos_dir().display(), "some catalog videos are missing");
        }
        let playback = Arc::new(PlaybackSynchronizer::new());
        let retry = config.retry.to_retry_config();

        let gemini_key = secrets.api_key("gemini").unwrap_or_else(|| {
            warn!("no gemini api key configured");
            String::new()
        });
        let gemini = match &config.generator.base_url {
            Some(url) => GeminiClient::with_base_url(gemini_key, &config.generator.model, url)?,
            None => GeminiClient::new(gemini_key, &config.generator.model)?,
        }
        .with_persona(Persona::load(&config.character_config_path()));
        let generator = Arc::new(RetryingGenerator::new(Arc::new(gemini), retry.clone()));

        let aivis = AivisClient::with_options(
            &config.speech.base_url,
            config.speech.speaker,
            Duration::from_secs(config.speech.timeout_secs),
        )?;
        let synthesizer = Arc::new(RetryingSynthesizer::new(Arc::new(aivis), retry));

        let youtube_key = secrets.api_key("youtube").unwrap_or_else(|| {
            warn!("no youtube api key configured");
            String::new()
        });
        if config.chat.video_id.is_none() {
            warn!("no chat.video_id configured; no comments will arrive");
        }
        let chat = Arc::new(
            YouTubeChatClient::new(youtube_key, config.chat.video_id.clone())?
                .min_request_interval(config.chat.min_request_interval()),
        );

        let data_dir = config.data_dir();
        let responder = Responder::new(
            generator,
            synthesizer,
            Arc::clone(&scheduler),
            Arc::clone(&playback),
            CacheStore::open("responses", &config.cache.responses(), &data_dir),
            CacheStore::open("audio", &config.cache.audio(), &data_dir),
        );

        info!(base_dir = %config.base_dir().display(), "all services initialized successfully");
        Ok(Self::new(
            chat,
            responder,
            scheduler,
            playback,
            config.chat.poll_interval(),
        ))
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub fn scheduler(&self) -> &Arc<VideoScheduler> {
        &self.scheduler
    }

    pub fn playback(&self) -> &Arc<PlaybackSynchronizer> {
        &self.playback
    }

    /// Run until `shutdown` is cancelled, then clean up.
    pub async fn run(&self, shutdown: CancellationToken) {
        let idle = {
            let scheduler = Arc::clone(&self.scheduler);
            let talking = self.playback.subscribe();
            tokio::spawn(async move { scheduler.run_idle_loop(Some(talking)).await })
        };
        info!("streamer running");

        self.run_monitoring(&shutdown).await;
        info!("system shutdown requested");

        self.cleanup(idle).await;
    }

    /// Poll the chat source and process each comment in arrival order.
    async fn run_monitoring(&self, shutdown: &CancellationToken) {
        loop {
            let batch = tokio::select! {
                _ = shutdown.cancelled() => return,
                batch = self.chat.poll() => batch,
            };

            match batch {
                Ok(comments) => {
                    for comment in comments {
                        if shutdown.is_cancelled() {
                            return;
                        }
                        if self.responder.process_comment(&comment).await.is_some() {
                            let preview: String =
                                comment.message.chars().take(LOG_PREVIEW_CHARS).collect();
                            info!(user = %comment.username, message = %preview, "processed comment successfully");
                        }
                    }
                }
                Err(e) => error!(source = self.chat.name(), error = %e, "error getting comments"),
            }

            let swept = self.responder.clear_expired().await;
            if swept > 0 {
                debug!(removed = swept, "expired cache entries swept");
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn cleanup(&self, idle: JoinHandle<()>) {
        self.playback.cleanup().await;
        self.scheduler.stop();
        if let Err(e) = idle.await {
            error!(error = %e, "idle loop task failed");
        }
        self.responder.save_caches().await;
        info!("cleanup completed");
    }
}

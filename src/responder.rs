//! Chat comment processing.
//!
//! One comment goes through reply generation, speech synthesis, talking
//! clip selection and playback. Replies and audio are cached so repeated
//! comments replay without calling the collaborators again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::cache::CacheStore;
use crate::playback::PlaybackSynchronizer;
use crate::providers::{ReplyGenerator, SpeechSynthesizer};
use crate::telemetry;
use crate::types::{AudioClip, ChatMessage, ReplyPrompt};
use crate::video::{VideoAsset, VideoScheduler};

/// Result of a fully processed comment.
#[derive(Debug, Clone)]
pub struct ProcessedComment {
    pub response: String,
    pub video: VideoAsset,
    pub has_audio: bool,
}

/// When each viewer last commented, by user id.
#[derive(Debug, Default)]
pub struct ViewerLog {
    last_seen: HashMap<String, NaiveDate>,
}

impl ViewerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a comment from `user_id` on `date`.
    ///
    /// Returns `(first_time, first_today)`.
    pub fn record(&mut self, user_id: &str, date: NaiveDate) -> (bool, bool) {
        if user_id.is_empty() {
            return (false, false);
        }
        match self.last_seen.insert(user_id.to_string(), date) {
            None => (true, true),
            Some(previous) => (false, previous != date),
        }
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

/// Cache key for a generated reply.
pub fn response_cache_key(message: &str, user_id: &str) -> String {
    format!("{message}_{user_id}")
}

/// Cache key for synthesized audio of a reply.
pub fn audio_cache_key(response: &str) -> String {
    format!("audio_{response}")
}

/// Turns chat comments into talking sessions.
pub struct Responder {
    generator: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    scheduler: Arc<VideoScheduler>,
    playback: Arc<PlaybackSynchronizer>,
    responses: Mutex<CacheStore<String>>,
    audio: Mutex<CacheStore<AudioClip>>,
    viewers: Mutex<ViewerLog>,
}

impl Responder {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        scheduler: Arc<VideoScheduler>,
        playback: Arc<PlaybackSynchronizer>,
        responses: CacheStore<String>,
        audio: CacheStore<AudioClip>,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            scheduler,
            playback,
            responses: Mutex::new(responses),
            audio: Mutex::new(audio),
            viewers: Mutex::new(ViewerLog::new()),
        }
    }

    /// Process one comment end to end.
    ///
    /// Returns `None` if any step fails; playback is then left unchanged.
    pub async fn process_comment(&self, comment: &ChatMessage) -> Option<ProcessedComment> {
        let processed = self.respond(comment).await;
        let status = if processed.is_some() { "ok" } else { "failed" };
        metrics::counter!(telemetry::COMMENTS_TOTAL, "status" => status).increment(1);
        processed
    }

    async fn respond(&self, comment: &ChatMessage) -> Option<ProcessedComment> {
        let today = Local::now().date_naive();
        let (first_time, first_today) = self.viewers.lock().await.record(&comment.user_id, today);

        let response = self.reply_for(comment, first_time, first_today).await?;
        let audio = self.audio_for(&response).await?;

        let clip = self.scheduler.select_talking_clip(response.chars().count());
        let Some(video) = self.scheduler.prepare(&clip).await else {
            error!(path = %clip.display(), "failed to prepare video");
            return None;
        };

        if !self.playback.sync_media(video.clone(), audio).await {
            error!(path = %clip.display(), "failed to start playback");
            return None;
        }

        Some(ProcessedComment {
            response,
            video,
            has_audio: true,
        })
    }

    async fn reply_for(
        &self,
        comment: &ChatMessage,
        first_time: bool,
        first_today: bool,
    ) -> Option<String> {
        let key = response_cache_key(&comment.message, &comment.user_id);
        if let Some(cached) = self.responses.lock().await.get(&key) {
            debug!(user = %comment.username, "reply served from cache");
            return Some(cached);
        }

        let prompt = ReplyPrompt::new(&comment.message, &comment.username)
            .first_time(first_time)
            .first_today(first_today);
        match self.generator.generate(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => {
                self.responses.lock().await.set(key, reply.clone());
                Some(reply)
            }
            Ok(_) => {
                error!(generator = self.generator.name(), "failed to generate response: empty reply");
                None
            }
            Err(e) => {
                error!(generator = self.generator.name(), error = %e, "failed to generate response");
                None
            }
        }
    }

    async fn audio_for(&self, response: &str) -> Option<AudioClip> {
        let key = audio_cache_key(response);
        if let Some(cached) = self.audio.lock().await.get(&key) {
            debug!(bytes = cached.len(), "audio served from cache");
            return Some(cached);
        }

        match self.synthesizer.synthesize(response).await {
            Ok(clip) if !clip.is_empty() => {
                self.audio.lock().await.set(key, clip.clone());
                Some(clip)
            }
            Ok(_) => {
                error!(synthesizer = self.synthesizer.name(), "failed to synthesize speech: empty audio");
                None
            }
            Err(e) => {
                error!(synthesizer = self.synthesizer.name(), error = %e, "failed to synthesize speech");
                None
            }
        }
    }

    /// Write both cache snapshots. Returns `false` if either save failed.
    pub async fn save_caches(&self) -> bool {
        let mut ok = true;
        if let Err(e) = self.responses.lock().await.save() {
            error!(cache = "responses", error = %e, "failed to save cache");
            ok = false;
        }
        if let Err(e) = self.audio.lock().await.save() {
            error!(cache = "audio", error = %e, "failed to save cache");
            ok = false;
        }
        if ok {
            info!("caches saved");
        }
        ok
    }

    /// Sweep expired entries from both caches. Returns the number removed.
    ///
    /// The streamer calls this once per poll cycle.
    pub async fn clear_expired(&self) -> usize {
        let responses = self.responses.lock().await.clear_expired();
        let audio = self.audio.lock().await.clear_expired();
        responses + audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_log_flags() {
        let mut log = ViewerLog::new();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        assert_eq!(log.record("u1", monday), (true, true));
        assert_eq!(log.record("u1", monday), (false, false));
        assert_eq!(log.record("u1", tuesday), (false, true));
        assert_eq!(log.record("u2", tuesday), (true, true));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn anonymous_viewers_are_not_tracked() {
        let mut log = ViewerLog::new();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(log.record("", day), (false, false));
        assert!(log.is_empty());
    }

    #[test]
    fn cache_keys() {
        assert_eq!(response_cache_key("hello", "UC123"), "hello_UC123");
        assert_eq!(audio_cache_key("hi there"), "audio_hi there");
    }
}

//! End-to-end tests for the comment pipeline with mock collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use marionette::cache::{CacheConfig, CacheStore, FsMedium, ManualClock};
use marionette::playback::PlaybackSynchronizer;
use marionette::providers::{ReplyGenerator, SpeechSynthesizer};
use marionette::responder::Responder;
use marionette::types::{AudioClip, ChatMessage, ReplyPrompt};
use marionette::video::{AssetProbe, VideoCatalog, VideoScheduler, VideoStreamInfo};
use marionette::{MarionetteError, Result};
use tempfile::TempDir;

// ============================================================================
// Mock collaborators
// ============================================================================

struct MockGenerator {
    reply: Option<String>,
    calls: AtomicU32,
    prompts: Mutex<Vec<ReplyPrompt>>,
}

impl MockGenerator {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            ..Self::replying("")
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> ReplyPrompt {
        self.prompts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    async fn generate(&self, prompt: &ReplyPrompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        self.reply.clone().ok_or(MarionetteError::Api {
            status: 400,
            message: "bad request".into(),
        })
    }
}

struct MockSynthesizer {
    fail: bool,
    calls: AtomicU32,
}

impl MockSynthesizer {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    fn name(&self) -> &str {
        "mock-synthesizer"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MarionetteError::Http("connection refused".into()));
        }
        Ok(AudioClip::new(text.as_bytes().to_vec()))
    }
}

struct FixedProbe;

impl AssetProbe for FixedProbe {
    fn probe_video(&self, _path: &Path) -> Result<VideoStreamInfo> {
        Ok(VideoStreamInfo {
            width: 1280,
            height: 720,
            frame_count: 90,
            fps: 30.0,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

const CATALOG: &str = r#"{
    "video_files": {
        "idle": { "00": "idle.mp4" },
        "talking": ["short.mp4", "medium.mp4", "long.mp4"]
    },
    "idle_pattern": [ { "video": "00", "repeat": 1 } ]
}"#;

struct Harness {
    dir: TempDir,
    clock: Arc<ManualClock>,
    generator: Arc<MockGenerator>,
    synthesizer: Arc<MockSynthesizer>,
    playback: Arc<PlaybackSynchronizer>,
    responder: Responder,
}

fn harness(generator: MockGenerator, synthesizer: MockSynthesizer) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let videos = dir.path().join("videos");
    std::fs::create_dir_all(&videos).unwrap();
    let catalog = VideoCatalog::from_json(CATALOG).unwrap();
    for name in catalog.filenames() {
        std::fs::write(videos.join(name), b"video").unwrap();
    }

    let clock = Arc::new(ManualClock::new(1_700_000_000.0));
    let data = dir.path().join("data");
    let responses = CacheStore::open_with(
        "responses",
        &CacheConfig::new().max_entries(100).ttl(Duration::from_secs(3600)),
        &data,
        clock.clone(),
        Arc::new(FsMedium),
    );
    let audio = CacheStore::open_with(
        "audio",
        &CacheConfig::new().max_entries(50).ttl(Duration::from_secs(7200)),
        &data,
        clock.clone(),
        Arc::new(FsMedium),
    );

    let scheduler = Arc::new(VideoScheduler::new(&videos, catalog, Arc::new(FixedProbe)).unwrap());
    let playback = Arc::new(PlaybackSynchronizer::new());
    let generator = Arc::new(generator);
    let synthesizer = Arc::new(synthesizer);
    let responder = Responder::new(
        generator.clone(),
        synthesizer.clone(),
        scheduler,
        playback.clone(),
        responses,
        audio,
    );

    Harness {
        dir,
        clock,
        generator,
        synthesizer,
        playback,
        responder,
    }
}

fn comment(message: &str, user_id: &str) -> ChatMessage {
    ChatMessage::new(message, "viewer", user_id)
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn comment_starts_talking_session() {
    let h = harness(MockGenerator::replying("Hello there!"), MockSynthesizer::new(false));

    let processed = h.responder.process_comment(&comment("hi", "UC1")).await.unwrap();
    assert_eq!(processed.response, "Hello there!");
    assert_eq!(processed.video.filename, "short.mp4");
    assert!(processed.has_audio);

    let status = h.playback.get_playback_status();
    assert!(status.is_playing);
    assert_eq!(status.current_video, Some(processed.video.path.clone()));
}

#[tokio::test]
async fn long_reply_selects_long_clip() {
    let reply = "a".repeat(120);
    let h = harness(MockGenerator::replying(&reply), MockSynthesizer::new(false));

    let processed = h.responder.process_comment(&comment("tell me a story", "UC1")).await.unwrap();
    assert_eq!(processed.video.filename, "long.mp4");
}

#[tokio::test]
async fn repeated_comment_is_served_from_cache_until_ttl() {
    let h = harness(MockGenerator::replying("cached reply"), MockSynthesizer::new(false));

    h.responder.process_comment(&comment("hello", "UC1")).await.unwrap();
    h.responder.process_comment(&comment("hello", "UC1")).await.unwrap();
    assert_eq!(h.generator.calls(), 1);
    assert_eq!(h.synthesizer.calls(), 1);

    // same message from another viewer is a different key
    h.responder.process_comment(&comment("hello", "UC2")).await.unwrap();
    assert_eq!(h.generator.calls(), 2);
    // but the same reply text reuses the audio
    assert_eq!(h.synthesizer.calls(), 1);

    h.clock.advance(Duration::from_secs(3600));
    h.responder.process_comment(&comment("hello", "UC1")).await.unwrap();
    assert_eq!(h.generator.calls(), 3);
    // audio ttl is two hours
    assert_eq!(h.synthesizer.calls(), 1);
}

#[tokio::test]
async fn generator_failure_leaves_playback_unchanged() {
    let h = harness(MockGenerator::failing(), MockSynthesizer::new(false));

    assert!(h.responder.process_comment(&comment("hi", "UC1")).await.is_none());
    assert_eq!(h.synthesizer.calls(), 0);
    assert!(!h.playback.get_playback_status().is_playing);
}

#[tokio::test]
async fn synthesis_failure_keeps_generated_reply() {
    let h = harness(MockGenerator::replying("reply"), MockSynthesizer::new(true));

    assert!(h.responder.process_comment(&comment("hi", "UC1")).await.is_none());
    assert!(h.responder.process_comment(&comment("hi", "UC1")).await.is_none());
    assert_eq!(h.generator.calls(), 1);
    assert_eq!(h.synthesizer.calls(), 2);
    assert!(!h.playback.get_playback_status().is_playing);
}

#[tokio::test]
async fn prompt_flags_track_viewer_history() {
    let h = harness(MockGenerator::replying("ok"), MockSynthesizer::new(false));

    h.responder.process_comment(&comment("first", "UC1")).await.unwrap();
    let prompt = h.generator.last_prompt();
    assert!(prompt.first_time);
    assert!(prompt.first_today);
    assert_eq!(prompt.message, "first");
    assert_eq!(prompt.username, "viewer");

    h.responder.process_comment(&comment("second", "UC1")).await.unwrap();
    let prompt = h.generator.last_prompt();
    assert!(!prompt.first_time);
    assert!(!prompt.first_today);
}

#[tokio::test]
async fn save_caches_writes_both_snapshots() {
    let h = harness(MockGenerator::replying("saved"), MockSynthesizer::new(false));
    h.responder.process_comment(&comment("hi", "UC1")).await.unwrap();

    assert!(h.responder.save_caches().await);
    let data = h.dir.path().join("data");
    let responses: serde_json::Value =
        serde_json::from_slice(&std::fs::read(data.join("cache_responses.json")).unwrap()).unwrap();
    assert_eq!(responses["hi_UC1"]["value"], "saved");
    assert!(data.join("cache_audio.json").exists());
}

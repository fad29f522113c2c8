use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use marionette::providers::{
    ReplyGenerator, RetryConfig, RetryingGenerator, RetryingSynthesizer, SpeechSynthesizer,
};
use marionette::types::{AudioClip, ReplyPrompt};
use marionette::{MarionetteError, Result};

/// Mock collaborator that fails N times then succeeds.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> MarionetteError,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> MarionetteError) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            total_calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }

    fn next(&self) -> Result<()> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok(())
    }
}

#[async_trait]
impl ReplyGenerator for FailThenSucceed {
    fn name(&self) -> &str {
        "mock-retry"
    }

    async fn generate(&self, _prompt: &ReplyPrompt) -> Result<String> {
        self.next().map(|()| "ok".to_string())
    }
}

#[async_trait]
impl SpeechSynthesizer for FailThenSucceed {
    fn name(&self) -> &str {
        "mock-retry"
    }

    async fn synthesize(&self, _text: &str) -> Result<AudioClip> {
        self.next().map(|()| AudioClip::new(vec![1, 2, 3]))
    }
}

fn server_error() -> MarionetteError {
    MarionetteError::Api {
        status: 503,
        message: "unavailable".into(),
    }
}

fn prompt() -> ReplyPrompt {
    ReplyPrompt::new("hello", "alice")
}

// ============================================================================
// Generator
// ============================================================================

#[tokio::test(start_paused = true)]
async fn retries_transient_errors_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2, server_error));
    let retrying = RetryingGenerator::new(inner.clone(), RetryConfig::new().max_attempts(3));

    let reply = retrying.generate(&prompt()).await.unwrap();
    assert_eq!(reply, "ok");
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let inner = Arc::new(FailThenSucceed::new(10, server_error));
    let retrying = RetryingGenerator::new(inner.clone(), RetryConfig::new().max_attempts(3));

    let err = retrying.generate(&prompt()).await.unwrap_err();
    assert!(matches!(err, MarionetteError::Api { status: 503, .. }));
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_are_not_retried() {
    let inner = Arc::new(FailThenSucceed::new(1, || {
        MarionetteError::AuthenticationFailed
    }));
    let retrying = RetryingGenerator::new(inner.clone(), RetryConfig::new().max_attempts(5));

    let err = retrying.generate(&prompt()).await.unwrap_err();
    assert!(matches!(err, MarionetteError::AuthenticationFailed));
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_config_makes_a_single_attempt() {
    let inner = Arc::new(FailThenSucceed::new(1, server_error));
    let retrying = RetryingGenerator::new(inner.clone(), RetryConfig::disabled());

    assert!(retrying.generate(&prompt()).await.is_err());
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_hint_sets_the_delay() {
    let inner = Arc::new(FailThenSucceed::new(1, || MarionetteError::RateLimited {
        retry_after: Some(Duration::from_secs(7)),
    }));
    let retrying = RetryingGenerator::new(inner.clone(), RetryConfig::new());

    let started = tokio::time::Instant::now();
    retrying.generate(&prompt()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(7));
    assert_eq!(inner.call_count(), 2);
}

// ============================================================================
// Synthesizer
// ============================================================================

#[tokio::test(start_paused = true)]
async fn synthesizer_retries_network_errors() {
    let inner = Arc::new(FailThenSucceed::new(1, || {
        MarionetteError::Http("connection reset".into())
    }));
    let retrying = RetryingSynthesizer::new(inner.clone(), RetryConfig::new());

    let clip = retrying.synthesize("hello").await.unwrap();
    assert_eq!(clip.as_bytes(), &[1, 2, 3]);
    assert_eq!(inner.call_count(), 2);
    assert_eq!(retrying.name(), "mock-retry");
}

#[tokio::test(start_paused = true)]
async fn synthesizer_empty_response_is_not_retried() {
    let inner = Arc::new(FailThenSucceed::new(3, || MarionetteError::EmptyResponse));
    let retrying = RetryingSynthesizer::new(inner.clone(), RetryConfig::new());

    assert!(retrying.synthesize("hello").await.is_err());
    assert_eq!(inner.call_count(), 1);
}

// ============================================================================
// RetryConfig
// ============================================================================

#[test]
fn backoff_doubles_and_caps() {
    let config = RetryConfig::new()
        .initial_delay(Duration::from_millis(100))
        .max_delay(Duration::from_millis(350));
    assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
    assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
    assert_eq!(config.delay_for_attempt(2), Duration::from_millis(350));
    assert_eq!(config.delay_for_attempt(10), Duration::from_millis(350));
}

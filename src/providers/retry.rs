//! Retry configuration and collaborator decorators.
//!
//! [`RetryingGenerator`] and [`RetryingSynthesizer`] wrap a collaborator and
//! retry transient failures with exponential backoff. Both delegate to the
//! shared `with_retry()` helper.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::traits::{ReplyGenerator, SpeechSynthesizer};
use crate::Result;
use crate::telemetry;
use crate::types::{AudioClip, ReplyPrompt};

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use marionette::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(1), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries. Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that makes a single attempt.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// `initial_delay * 2^attempt`, capped at `max_delay` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Backoff for `attempt`, unless the server asked for a specific wait.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Run `f` until it succeeds, fails permanently, or attempts run out.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    collaborator: &str,
    operation: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                metrics::counter!(telemetry::RETRIES_TOTAL,
                    "collaborator" => collaborator.to_owned(),
                    "operation" => operation.to_owned(),
                )
                .increment(1);
                let delay = config.effective_delay(attempt, e.retry_after());
                warn!(
                    collaborator,
                    operation,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// RetryingGenerator
// ============================================================================

/// Decorator that retries a [`ReplyGenerator`] on transient errors.
pub struct RetryingGenerator {
    inner: Arc<dyn ReplyGenerator>,
    config: RetryConfig,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn ReplyGenerator>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ReplyGenerator for RetryingGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &ReplyPrompt) -> Result<String> {
        with_retry(&self.config, self.inner.name(), "generate", || {
            self.inner.generate(prompt)
        })
        .await
    }
}

// ============================================================================
// RetryingSynthesizer
// ============================================================================

/// Decorator that retries a [`SpeechSynthesizer`] on transient errors.
pub struct RetryingSynthesizer {
    inner: Arc<dyn SpeechSynthesizer>,
    config: RetryConfig,
}

impl RetryingSynthesizer {
    pub fn new(inner: Arc<dyn SpeechSynthesizer>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl SpeechSynthesizer for RetryingSynthesizer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        with_retry(&self.config, self.inner.name(), "synthesize", || {
            self.inner.synthesize(text)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn retry_after_hint_wins() {
        let config = RetryConfig::new();
        assert_eq!(
            config.effective_delay(0, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
    }
}

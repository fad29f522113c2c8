//! Telemetry metric name constants.
//!
//! Centralised metric names for marionette components. Embedders install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `marionette_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `cache`: cache instance name (e.g. "responses", "audio")
//! - `outcome`: playback session outcome: "completed" or "cancelled"
//! - `status`: comment processing outcome: "ok" or "failed"
//! - `collaborator`: external collaborator name (e.g. "gemini", "aivis")

/// Total cache lookups that returned a live entry.
///
/// Labels: `cache`.
pub const CACHE_HITS_TOTAL: &str = "marionette_cache_hits_total";

/// Total cache lookups that found nothing or an expired entry.
///
/// Labels: `cache`.
pub const CACHE_MISSES_TOTAL: &str = "marionette_cache_misses_total";

/// Total entries evicted to stay within the size bound.
///
/// Labels: `cache`.
pub const CACHE_EVICTIONS_TOTAL: &str = "marionette_cache_evictions_total";

/// Total snapshot writes that failed (backup restored).
///
/// Labels: `cache`.
pub const CACHE_PERSIST_FAILURES_TOTAL: &str = "marionette_cache_persist_failures_total";

/// Total playback sessions that ended.
///
/// Labels: `outcome` ("completed" | "cancelled").
pub const PLAYBACK_SESSIONS_TOTAL: &str = "marionette_playback_sessions_total";

/// Total idle-pattern steps taken by the idle loop.
pub const IDLE_STEPS_TOTAL: &str = "marionette_idle_steps_total";

/// Total chat comments processed.
///
/// Labels: `status` ("ok" | "failed").
pub const COMMENTS_TOTAL: &str = "marionette_comments_total";

/// Total retry attempts against external collaborators (not counting the initial request).
///
/// Labels: `collaborator`, `operation`.
pub const RETRIES_TOTAL: &str = "marionette_retries_total";

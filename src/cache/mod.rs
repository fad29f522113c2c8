//! Caching subsystem.
//!
//! [`CacheStore`] is a size-bounded TTL map with crash-safe JSON snapshot
//! persistence. The service keeps two instances:
//!
//! - `responses`: generated reply text keyed on `"{message}_{user_id}"`.
//! - `audio`: synthesized speech keyed on `"audio_{reply}"`.
//!
//! Expiry is lazy: an entry past its TTL is dropped when a read touches it,
//! or by an explicit [`CacheStore::clear_expired()`] sweep. Eviction on a
//! full store is oldest-first by insertion (or refresh) time, not by access.
//!
//! Timestamps come from a [`Clock`] and snapshots go through a
//! [`SnapshotMedium`], so both can be substituted in tests.

pub mod clock;
pub mod medium;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use medium::{FsMedium, SnapshotMedium};
pub use store::{CacheEntry, CacheStore};

use std::time::Duration;

/// Configuration for a single [`CacheStore`].
///
/// ```rust
/// # use marionette::cache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(50)
///     .ttl(Duration::from_secs(7200));
/// assert_eq!(config.max_entries, 50);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of live entries. Default: 100.
    pub max_entries: usize,
    /// Time-to-live for entries, measured from insertion. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

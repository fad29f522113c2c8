//! Wall-clock sources for cache timestamps.
//!
//! Cache timestamps are persisted, so they are wall-clock seconds since the
//! unix epoch rather than monotonic instants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" for cache entries, in fractional unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock that only moves when told to.
///
/// ```rust
/// # use marionette::cache::{Clock, ManualClock};
/// # use std::time::Duration;
/// let clock = ManualClock::new(1_000.0);
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now(), 1_005.0);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.set(self.now() + by.as_secs_f64());
    }

    /// Jump to an absolute time.
    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

//! Size-bounded TTL store with crash-safe snapshot persistence.
//!
//! # Snapshot protocol
//!
//! Every successful [`set()`](CacheStore::set) and every non-empty
//! [`clear_expired()`](CacheStore::clear_expired) rewrites the whole
//! snapshot:
//!
//! 1. serialize the in-memory entries (nothing on disk is touched if this fails)
//! 2. rename `cache_{name}.json` → `cache_{name}_backup.json`
//! 3. write the new `cache_{name}.json`
//! 4. if step 3 fails, rename the backup back over the primary
//!
//! A crash between 2 and 3 leaves only the backup; [`load()`](CacheStore::load)
//! recovers from it when the primary is missing or unreadable.
//!
//! Volumes are small (tens to low hundreds of entries) and writes are not
//! hot, so a full rewrite per mutation is acceptable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{CacheConfig, Clock, FsMedium, SnapshotMedium, SystemClock};
use crate::telemetry;
use crate::{MarionetteError, Result};

/// A cached value and the wall-clock second it was inserted (or refreshed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub value: V,
    pub timestamp: f64,
}

type Snapshot<V> = HashMap<String, CacheEntry<V>>;

/// Named, size-bounded TTL cache persisted to one JSON file plus one backup.
///
/// Owned by a single logical writer; methods that mutate take `&mut self`.
pub struct CacheStore<V> {
    name: String,
    entries: Snapshot<V>,
    max_entries: usize,
    ttl: Duration,
    path: PathBuf,
    backup_path: PathBuf,
    clock: Arc<dyn Clock>,
    medium: Arc<dyn SnapshotMedium>,
}

impl<V> CacheStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Open the store named `name` under `dir`, loading any existing snapshot.
    pub fn open(name: impl Into<String>, config: &CacheConfig, dir: &Path) -> Self {
        Self::open_with(
            name,
            config,
            dir,
            Arc::new(SystemClock),
            Arc::new(FsMedium),
        )
    }

    /// Like [`open()`](Self::open) with an explicit clock and storage medium.
    pub fn open_with(
        name: impl Into<String>,
        config: &CacheConfig,
        dir: &Path,
        clock: Arc<dyn Clock>,
        medium: Arc<dyn SnapshotMedium>,
    ) -> Self {
        let name = name.into();
        let mut store = Self {
            path: dir.join(format!("cache_{name}.json")),
            backup_path: dir.join(format!("cache_{name}_backup.json")),
            name,
            entries: HashMap::new(),
            max_entries: config.max_entries,
            ttl: config.ttl,
            clock,
            medium,
        };
        store.load();
        store
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Number of entries held in memory, including not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a live entry.
    ///
    /// An entry found past its TTL is removed and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let fresh = self.entries.get(key).map(|e| !self.is_expired(e, now));

        match fresh {
            Some(true) => {
                debug!(cache = %self.name, key, "cache hit");
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => self.name.clone())
                    .increment(1);
                self.entries.get(key).map(|e| e.value.clone())
            }
            Some(false) => {
                self.entries.remove(key);
                debug!(cache = %self.name, key, "expired cache entry removed");
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => self.name.clone())
                    .increment(1);
                None
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => self.name.clone())
                    .increment(1);
                None
            }
        }
    }

    /// Insert or overwrite an entry stamped with the current time, then persist.
    ///
    /// A new key on a full store first evicts the entry with the smallest
    /// timestamp; equal timestamps are broken by the smallest key.
    /// Persistence is best-effort: a failed write is logged and the
    /// in-memory insert stands.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if self.max_entries == 0 {
            debug!(cache = %self.name, key = %key, "cache disabled (max_entries = 0)");
            return;
        }

        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.max_entries {
                if !self.evict_oldest() {
                    break;
                }
            }
        }

        let timestamp = self.clock.now();
        self.entries.insert(key.clone(), CacheEntry { value, timestamp });
        debug!(cache = %self.name, key = %key, "added to cache");
        self.persist();
    }

    /// Drop every entry whose age has reached the TTL.
    ///
    /// Persists only if something was removed. Returns the number removed.
    pub fn clear_expired(&mut self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl.as_secs_f64();
        let before = self.entries.len();
        self.entries.retain(|_, e| now - e.timestamp < ttl);
        let removed = before - self.entries.len();

        if removed > 0 {
            info!(cache = %self.name, removed, "cleared expired cache entries");
            self.persist();
        }
        removed
    }

    /// Replace the in-memory entries with the on-disk snapshot.
    ///
    /// Entries already expired relative to now are discarded. A missing or
    /// corrupt primary falls back to the backup; if neither is usable the
    /// store is empty. Never fails.
    pub fn load(&mut self) {
        let snapshot = match self.read_snapshot(&self.path) {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                debug!(cache = %self.name, path = %self.path.display(), "no cache snapshot");
                self.recover_from_backup()
            }
            Err(e) => {
                error!(
                    cache = %self.name,
                    path = %self.path.display(),
                    error = %e,
                    "error loading cache snapshot"
                );
                self.recover_from_backup()
            }
        };

        let now = self.clock.now();
        let ttl = self.ttl.as_secs_f64();
        self.entries = snapshot
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, e)| now - e.timestamp < ttl)
            .collect();

        while self.entries.len() > self.max_entries {
            if !self.evict_oldest() {
                break;
            }
        }

        info!(
            cache = %self.name,
            entries = self.entries.len(),
            "loaded valid cache entries"
        );
    }

    /// Write the snapshot using the backup-then-write protocol.
    ///
    /// On a failed write the backup is restored so the primary file is
    /// byte-identical to before the call. In-memory state is unaffected.
    pub fn save(&self) -> Result<()> {
        let bytes = serde_json::to_vec(&self.entries)?;

        let backed_up = if self.medium.exists(&self.path) {
            self.medium.rename(&self.path, &self.backup_path)?;
            true
        } else {
            false
        };

        if let Err(e) = self.medium.write(&self.path, &bytes) {
            self.roll_back(backed_up);
            return Err(MarionetteError::Io(e));
        }

        debug!(cache = %self.name, entries = self.entries.len(), "saved cache");
        Ok(())
    }

    fn roll_back(&self, backed_up: bool) {
        let outcome = if backed_up {
            self.medium.rename(&self.backup_path, &self.path)
        } else if self.medium.exists(&self.path) {
            self.medium.remove(&self.path)
        } else {
            Ok(())
        };
        if let Err(e) = outcome {
            error!(
                cache = %self.name,
                path = %self.path.display(),
                error = %e,
                "failed to restore cache snapshot from backup"
            );
        }
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            error!(cache = %self.name, error = %e, "error saving cache");
            metrics::counter!(
                telemetry::CACHE_PERSIST_FAILURES_TOTAL,
                "cache" => self.name.clone()
            )
            .increment(1);
        }
    }

    fn recover_from_backup(&self) -> Option<Snapshot<V>> {
        match self.read_snapshot(&self.backup_path) {
            Ok(Some(snapshot)) => {
                warn!(
                    cache = %self.name,
                    path = %self.backup_path.display(),
                    "recovered cache from backup snapshot"
                );
                Some(snapshot)
            }
            Ok(None) => None,
            Err(e) => {
                error!(
                    cache = %self.name,
                    path = %self.backup_path.display(),
                    error = %e,
                    "backup cache snapshot unusable"
                );
                None
            }
        }
    }

    fn read_snapshot(&self, path: &Path) -> Result<Option<Snapshot<V>>> {
        if !self.medium.exists(path) {
            return Ok(None);
        }
        let bytes = self.medium.read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Remove the entry with the smallest `(timestamp, key)`. Returns false if empty.
    fn evict_oldest(&mut self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by(|(ka, a), (kb, b)| {
                a.timestamp
                    .total_cmp(&b.timestamp)
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(k, _)| k.clone());

        match victim {
            Some(key) => {
                self.entries.remove(&key);
                debug!(cache = %self.name, key = %key, "removed oldest cache entry");
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "cache" => self.name.clone())
                    .increment(1);
                true
            }
            None => false,
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: f64) -> bool {
        now - entry.timestamp >= self.ttl.as_secs_f64()
    }
}

//! Integration tests for `CacheStore`: bounds, expiry, and snapshot safety.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use marionette::cache::{CacheConfig, CacheStore, FsMedium, ManualClock, SnapshotMedium};
use marionette::types::AudioClip;

const START: f64 = 1_700_000_000.0;

// ============================================================================
// Helpers
// ============================================================================

fn config(max_entries: usize, ttl_secs: u64) -> CacheConfig {
    CacheConfig::new()
        .max_entries(max_entries)
        .ttl(Duration::from_secs(ttl_secs))
}

fn open_store(dir: &Path, clock: &Arc<ManualClock>, config: &CacheConfig) -> CacheStore<String> {
    CacheStore::open_with("responses", config, dir, clock.clone(), Arc::new(FsMedium))
}

/// Filesystem medium whose writes fail while `fail_writes` is set.
#[derive(Default)]
struct FlakyMedium {
    fail_writes: AtomicBool,
}

impl SnapshotMedium for FlakyMedium {
    fn exists(&self, path: &Path) -> bool {
        FsMedium.exists(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        FsMedium.read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            // leave a truncated file behind, as a crash mid-write would
            std::fs::write(path, &bytes[..bytes.len() / 2])?;
            return Err(io::Error::other("disk full"));
        }
        FsMedium.write(path, bytes)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        FsMedium.rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        FsMedium.remove(path)
    }
}

// ============================================================================
// Size bound and eviction
// ============================================================================

#[test]
fn size_never_exceeds_max() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store = open_store(dir.path(), &clock, &config(3, 3600));

    for i in 0..10 {
        clock.advance(Duration::from_secs(1));
        store.set(format!("k{i}"), format!("v{i}"));
        assert!(store.len() <= 3);
    }
    assert_eq!(store.len(), 3);
}

#[test]
fn new_key_on_full_store_evicts_oldest() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store = open_store(dir.path(), &clock, &config(2, 3600));

    store.set("a", "1".to_string());
    clock.advance(Duration::from_secs(1));
    store.set("b", "2".to_string());
    clock.advance(Duration::from_secs(1));
    store.set("c", "3".to_string());

    assert_eq!(store.get("a"), None);
    assert_eq!(store.get("b").as_deref(), Some("2"));
    assert_eq!(store.get("c").as_deref(), Some("3"));
}

#[test]
fn refreshing_a_key_moves_it_to_newest() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store = open_store(dir.path(), &clock, &config(2, 3600));

    store.set("a", "1".to_string());
    clock.advance(Duration::from_secs(1));
    store.set("b", "2".to_string());
    clock.advance(Duration::from_secs(1));
    store.set("a", "1b".to_string());
    clock.advance(Duration::from_secs(1));
    store.set("c", "3".to_string());

    // b was the oldest after a's refresh
    assert_eq!(store.get("b"), None);
    assert_eq!(store.get("a").as_deref(), Some("1b"));
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn expired_entry_is_absent_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store = open_store(dir.path(), &clock, &config(10, 60));

    store.set("k", "v".to_string());
    clock.advance(Duration::from_secs(59));
    assert_eq!(store.get("k").as_deref(), Some("v"));

    clock.advance(Duration::from_secs(1));
    assert_eq!(store.get("k"), None);
    assert_eq!(store.len(), 0);
    assert_eq!(store.get("k"), None);
}

#[test]
fn clear_expired_removes_only_stale_entries() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store = open_store(dir.path(), &clock, &config(10, 100));

    store.set("old1", "x".to_string());
    store.set("old2", "x".to_string());
    clock.advance(Duration::from_secs(60));
    store.set("new", "y".to_string());
    clock.advance(Duration::from_secs(50));

    assert_eq!(store.clear_expired(), 2);
    assert_eq!(store.len(), 1);
    assert_eq!(store.clear_expired(), 0);

    // the sweep was persisted
    let reloaded = open_store(dir.path(), &clock, &config(10, 100));
    assert_eq!(reloaded.len(), 1);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store = open_store(dir.path(), &clock, &config(10, 3600));
    store.set("hello_UC1", "hi there".to_string());
    drop(store);

    let mut reopened = open_store(dir.path(), &clock, &config(10, 3600));
    assert_eq!(reopened.get("hello_UC1").as_deref(), Some("hi there"));
    assert!(dir.path().join("cache_responses.json").exists());
}

#[test]
fn snapshot_uses_value_timestamp_format() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store = open_store(dir.path(), &clock, &config(10, 3600));
    store.set("k", "v".to_string());

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["k"]["value"], "v");
    assert_eq!(json["k"]["timestamp"], START);
}

#[test]
fn load_discards_entries_expired_while_offline() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store = open_store(dir.path(), &clock, &config(10, 60));
    store.set("stale", "x".to_string());
    clock.advance(Duration::from_secs(30));
    store.set("fresh", "y".to_string());
    drop(store);

    clock.advance(Duration::from_secs(40));
    let mut reopened = open_store(dir.path(), &clock, &config(10, 60));
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.get("fresh").as_deref(), Some("y"));
}

#[test]
fn corrupt_snapshot_without_backup_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cache_responses.json"), b"{not json").unwrap();

    let clock = Arc::new(ManualClock::new(START));
    let store = open_store(dir.path(), &clock, &config(10, 60));
    assert!(store.is_empty());
}

#[test]
fn missing_primary_recovers_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store = open_store(dir.path(), &clock, &config(10, 3600));
    store.set("k", "v".to_string());
    drop(store);

    // crash between "rename primary to backup" and "write primary"
    std::fs::rename(
        dir.path().join("cache_responses.json"),
        dir.path().join("cache_responses_backup.json"),
    )
    .unwrap();

    let mut recovered = open_store(dir.path(), &clock, &config(10, 3600));
    assert_eq!(recovered.get("k").as_deref(), Some("v"));
}

#[test]
fn failed_write_leaves_primary_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let medium = Arc::new(FlakyMedium::default());
    let mut store: CacheStore<String> = CacheStore::open_with(
        "responses",
        &config(10, 3600),
        dir.path(),
        clock.clone(),
        medium.clone(),
    );

    store.set("a", "1".to_string());
    let before = std::fs::read(store.path()).unwrap();

    medium.fail_writes.store(true, Ordering::SeqCst);
    store.set("b", "2".to_string());
    assert!(store.save().is_err());

    let after = std::fs::read(store.path()).unwrap();
    assert_eq!(before, after);
    // in-memory state keeps the insert
    assert_eq!(store.get("b").as_deref(), Some("2"));
}

#[test]
fn failed_first_write_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let medium = Arc::new(FlakyMedium::default());
    medium.fail_writes.store(true, Ordering::SeqCst);

    let mut store: CacheStore<String> = CacheStore::open_with(
        "responses",
        &config(10, 3600),
        dir.path(),
        clock.clone(),
        medium,
    );
    store.set("a", "1".to_string());
    assert!(!store.path().exists());
}

#[test]
fn audio_clips_round_trip_through_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let mut store: CacheStore<AudioClip> = CacheStore::open_with(
        "audio",
        &config(50, 7200),
        dir.path(),
        clock.clone(),
        Arc::new(FsMedium),
    );
    store.set("audio_hi", AudioClip::new(vec![0x52, 0x49, 0x46, 0x46, 0x00]));
    drop(store);

    let mut reopened: CacheStore<AudioClip> = CacheStore::open_with(
        "audio",
        &config(50, 7200),
        dir.path(),
        clock,
        Arc::new(FsMedium),
    );
    let clip = reopened.get("audio_hi").unwrap();
    assert_eq!(clip.as_bytes(), &[0x52, 0x49, 0x46, 0x46, 0x00]);
}

//! Content-addressed cache with TTL expiry and a byte budget.
//!
//! - **Policy** ([`Cache`]): expiry, access accounting, eviction, stats
//! - **Media** ([`backend`]): [`MemoryBackend`], [`FileBackend`],
//!   [`DurableBackend`]
//!
//! Backend failures never propagate out of lookups or inserts: they are
//! logged and the operation behaves as a miss.

pub mod backend;
pub mod durable;
pub mod file;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

pub use backend::{CacheBackend, MemoryBackend};
pub use durable::DurableBackend;
pub use file::FileBackend;

/// Result type for cache backend operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Data-type tag used when none is given.
pub const DEFAULT_DATA_TYPE: &str = "general";

/// Build a content-addressed key: `prefix_` + SHA-256 hex of `content`.
/// An empty prefix yields the bare digest.
pub fn cache_key(prefix: &str, content: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(content));
    if prefix.is_empty() {
        digest
    } else {
        format!("{prefix}_{digest}")
    }
}

/// Metadata for one cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub data_type: String,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry is expired from its expiry instant onward.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Budget and TTL settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total payload bytes kept after any write (default: 200 MiB).
    pub max_size_bytes: u64,
    /// TTL applied when a write gives none (default: 12 hours).
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 200 * 1024 * 1024,
            default_ttl_secs: 12 * 60 * 60,
        }
    }
}

/// Per data-type aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: usize,
    pub total_size: u64,
    pub total_access: u64,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_items: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub usage_percent: f64,
    pub type_statistics: BTreeMap<String, TypeStats>,
    pub timestamp: DateTime<Utc>,
}

type Index = HashMap<String, CacheEntry>;

/// TTL- and budget-bounded key/value cache over a [`CacheBackend`].
///
/// Every index read-modify-write (lookup accounting, insert, eviction)
/// happens under one mutex, so concurrent callers see a consistent index.
///
/// Inserts and removals persist the index immediately. Access counters
/// bumped by hits are written on the next mutation, on [`Cache::flush`],
/// or when the cache is dropped.
pub struct Cache {
    backend: Box<dyn CacheBackend>,
    index: Mutex<Index>,
    config: CacheConfig,
    dirty: AtomicBool,
}

impl Cache {
    /// Wrap a backend: reload its persisted index and purge expired entries.
    ///
    /// An unreadable index is logged and replaced with an empty one.
    pub fn new(backend: impl CacheBackend + 'static, config: CacheConfig) -> Self {
        let entries = backend.load_index().unwrap_or_else(|e| {
            tracing::warn!(
                backend = backend.kind(),
                error = %e,
                "cache index unreadable, starting empty"
            );
            Vec::new()
        });
        let cache = Self {
            index: Mutex::new(entries.into_iter().map(|e| (e.key.clone(), e)).collect()),
            backend: Box::new(backend),
            config,
            dirty: AtomicBool::new(false),
        };
        {
            let mut index = cache.lock();
            let purged = cache.purge_expired(&mut index, Utc::now());
            cache.persist(&index);
            tracing::info!(
                backend = cache.backend.kind(),
                entries = index.len(),
                purged,
                "cache opened"
            );
        }
        cache
    }

    /// Volatile in-process cache.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(MemoryBackend::new(), config)
    }

    /// Directory of `<key>.cache` blobs plus a JSON index.
    pub fn open_dir(dir: impl AsRef<Path>, config: CacheConfig) -> CacheResult<Self> {
        Ok(Self::new(FileBackend::open(dir.as_ref())?, config))
    }

    /// redb database in `dir`.
    pub fn open_durable(dir: impl AsRef<Path>, config: CacheConfig) -> CacheResult<Self> {
        Ok(Self::new(DurableBackend::open(dir.as_ref())?, config))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, index: &Index) {
        let entries: Vec<CacheEntry> = index.values().cloned().collect();
        match self.backend.save_index(&entries) {
            Ok(()) => self.dirty.store(false, Ordering::Release),
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                tracing::warn!(error = %e, "failed to persist cache index");
            }
        }
    }

    /// Write pending access counters to the backend.
    pub fn flush(&self) {
        if self.dirty.load(Ordering::Acquire) {
            let index = self.lock();
            self.persist(&index);
        }
    }

    /// Delete the payload, then its metadata. A failed delete keeps the
    /// entry indexed so a later purge or eviction retries it.
    fn drop_entry(&self, index: &mut Index, key: &str) -> bool {
        if let Err(e) = self.backend.delete(key) {
            tracing::warn!(key, error = %e, "failed to delete cache payload");
            return false;
        }
        index.remove(key);
        true
    }

    fn purge_expired(&self, index: &mut Index, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = index
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();
        expired
            .iter()
            .filter(|key| self.drop_entry(index, key))
            .count()
    }

    /// Fetch a payload. Absent, expired, or unreadable entries are misses;
    /// expired ones are purged on the way. A hit bumps the access counters.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut index = self.lock();
        let now = Utc::now();
        let expired = index.get(key)?.is_expired(now);
        if expired {
            tracing::debug!(key, "cache entry expired");
            self.drop_entry(&mut index, key);
            self.persist(&index);
            return None;
        }

        match self.backend.read(key) {
            Ok(Some(bytes)) => {
                if let Some(entry) = index.get_mut(key) {
                    entry.access_count += 1;
                    entry.last_accessed = now;
                }
                self.dirty.store(true, Ordering::Release);
                Some(bytes)
            }
            Ok(None) => {
                tracing::warn!(key, "cache payload missing, dropping entry");
                index.remove(key);
                self.persist(&index);
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store a payload with the default data type. Returns whether it was stored.
    pub fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        self.set_typed(key, value, ttl, DEFAULT_DATA_TYPE)
    }

    /// Store a payload tagged with `data_type`, then enforce the byte budget.
    ///
    /// `ttl = None` uses the configured default; a zero TTL stores an entry
    /// that is already expired.
    pub fn set_typed(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
        data_type: &str,
    ) -> bool {
        let mut index = self.lock();
        if let Err(e) = self.backend.write(key, value) {
            tracing::warn!(key, error = %e, "cache write failed");
            return false;
        }

        let now = Utc::now();
        let ttl = ttl.unwrap_or(Duration::from_secs(self.config.default_ttl_secs));
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        index.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                created_at: now,
                expires_at,
                size_bytes: value.len() as u64,
                data_type: data_type.to_string(),
                access_count: 0,
                last_accessed: now,
            },
        );

        self.enforce_budget(&mut index, now);
        self.persist(&index);
        index.contains_key(key)
    }

    /// Drop expired entries if over budget, then evict least-used entries
    /// ascending by (access_count, last_accessed, key) until within budget.
    fn enforce_budget(&self, index: &mut Index, now: DateTime<Utc>) {
        let total = |index: &Index| index.values().map(|e| e.size_bytes).sum::<u64>();
        if total(index) <= self.config.max_size_bytes {
            return;
        }
        self.purge_expired(index, now);

        let mut size = total(index);
        if size <= self.config.max_size_bytes {
            return;
        }
        let mut victims: Vec<(u64, DateTime<Utc>, String, u64)> = index
            .values()
            .map(|e| (e.access_count, e.last_accessed, e.key.clone(), e.size_bytes))
            .collect();
        victims.sort();

        for (_, _, key, bytes) in victims {
            if size <= self.config.max_size_bytes {
                break;
            }
            tracing::debug!(key = %key, bytes, "evicting cache entry");
            if self.drop_entry(index, &key) {
                size -= bytes;
            }
        }
    }

    /// Remove one entry. Returns whether an entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        let mut index = self.lock();
        let existed = index.contains_key(key);
        let removed = self.drop_entry(&mut index, key) && existed;
        self.persist(&index);
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut index = self.lock();
        index.clear();
        if let Err(e) = self.backend.clear() {
            tracing::warn!(error = %e, "cache clear failed");
        }
        self.persist(&index);
        tracing::info!("cache cleared");
    }

    /// Fetch and decode a JSON payload. Undecodable payloads are misses.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "cached payload failed to decode");
                None
            }
        }
    }

    /// Encode a value as JSON and store it.
    pub fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        data_type: &str,
    ) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set_typed(key, &bytes, ttl, data_type),
            Err(e) => {
                tracing::warn!(key, error = %e, "value failed to encode for cache");
                false
            }
        }
    }

    /// Whether a live (unexpired) entry exists, without touching access counters.
    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|e| !e.is_expired(Utc::now()))
    }

    /// Metadata for one entry.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.lock();
        let total_size_bytes: u64 = index.values().map(|e| e.size_bytes).sum();
        let mut type_statistics: BTreeMap<String, TypeStats> = BTreeMap::new();
        for entry in index.values() {
            let stats = type_statistics.entry(entry.data_type.clone()).or_default();
            stats.count += 1;
            stats.total_size += entry.size_bytes;
            stats.total_access += entry.access_count;
        }
        let usage_percent = if self.config.max_size_bytes > 0 {
            total_size_bytes as f64 / self.config.max_size_bytes as f64 * 100.0
        } else {
            0.0
        };
        CacheStats {
            total_items: index.len(),
            total_size_bytes,
            max_size_bytes: self.config.max_size_bytes,
            usage_percent,
            type_statistics,
            timestamp: Utc::now(),
        }
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.kind())
            .field("entries", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// In-memory backend whose deletes can be made to fail and which counts
    /// index writes.
    #[derive(Debug, Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_deletes: Arc<AtomicBool>,
        index_saves: Arc<AtomicUsize>,
    }

    impl CacheBackend for FlakyBackend {
        fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &[u8]) -> CacheResult<()> {
            self.inner.write(key, value)
        }

        fn delete(&self, key: &str) -> CacheResult<()> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(CacheError::Io {
                    path: key.to_string(),
                    source: std::io::Error::other("disk unavailable"),
                });
            }
            self.inner.delete(key)
        }

        fn clear(&self) -> CacheResult<()> {
            self.inner.clear()
        }

        fn load_index(&self) -> CacheResult<Vec<CacheEntry>> {
            Ok(Vec::new())
        }

        fn save_index(&self, _entries: &[CacheEntry]) -> CacheResult<()> {
            self.index_saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "flaky"
        }
    }

    fn small(max: u64) -> CacheConfig {
        CacheConfig {
            max_size_bytes: max,
            ..Default::default()
        }
    }

    #[test]
    fn key_is_prefixed_sha256() {
        let key = cache_key("nlq", b"abc");
        assert_eq!(
            key,
            "nlq_ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(cache_key("", b"abc").len(), 64);
    }

    #[test]
    fn round_trip_counts_accesses() {
        let cache = Cache::in_memory(CacheConfig::default());
        assert!(cache.set("k", b"value", None));
        assert_eq!(cache.get("k"), Some(b"value".to_vec()));
        assert_eq!(cache.get("k"), Some(b"value".to_vec()));
        assert_eq!(cache.entry("k").unwrap().access_count, 2);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn zero_ttl_is_an_immediate_miss() {
        let cache = Cache::in_memory(CacheConfig::default());
        assert!(cache.set("k", b"v", Some(Duration::ZERO)));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn ttl_expiry_purges_on_access() {
        let cache = Cache::in_memory(CacheConfig::default());
        cache.set("k", b"v", Some(Duration::from_millis(30)));
        assert!(cache.contains("k"));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("k"), None);
        assert!(cache.entry("k").is_none());
    }

    #[test]
    fn least_used_entry_is_evicted_first() {
        let cache = Cache::in_memory(small(10));
        cache.set("a", &[0; 4], None);
        cache.set("b", &[0; 4], None);
        // Touch `a` so `b` is the least used.
        cache.get("a");
        cache.set("c", &[0; 4], None);

        // `b` and `c` both have zero accesses; `b` was stored earlier.
        assert!(cache.contains("a"));
        assert!(cache.contains("c"));
        assert!(!cache.contains("b"));
        assert!(cache.stats().total_size_bytes <= 10);
    }

    #[test]
    fn budget_holds_after_every_write() {
        let cache = Cache::in_memory(small(100));
        for i in 0..50 {
            cache.set(&format!("k{i}"), &[1; 17], None);
            assert!(cache.stats().total_size_bytes <= 100);
        }
    }

    #[test]
    fn oversized_value_is_not_kept() {
        let cache = Cache::in_memory(small(4));
        assert!(!cache.set("big", &[0; 8], None));
        assert!(cache.is_empty());
    }

    #[test]
    fn stats_group_by_data_type() {
        let cache = Cache::in_memory(small(1000));
        cache.set_typed("a", &[0; 10], None, "analysis");
        cache.set_typed("b", &[0; 30], None, "analysis");
        cache.set("c", &[0; 60], None);
        cache.get("a");

        let stats = cache.stats();
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.total_size_bytes, 100);
        assert!((stats.usage_percent - 10.0).abs() < 1e-9);
        let analysis = &stats.type_statistics["analysis"];
        assert_eq!(analysis.count, 2);
        assert_eq!(analysis.total_size, 40);
        assert_eq!(analysis.total_access, 1);
        assert_eq!(stats.type_statistics[DEFAULT_DATA_TYPE].count, 1);
    }

    #[test]
    fn json_helpers_round_trip() {
        let cache = Cache::in_memory(CacheConfig::default());
        let value = vec![("x".to_string(), 1.5_f64)];
        assert!(cache.set_json("j", &value, None, "analysis"));
        let back: Vec<(String, f64)> = cache.get_json("j").unwrap();
        assert_eq!(back, value);

        cache.set("raw", b"not json", None);
        assert!(cache.get_json::<Vec<u8>>("raw").is_none());
    }

    #[test]
    fn remove_and_clear() {
        let cache = Cache::in_memory(CacheConfig::default());
        cache.set("a", b"1", None);
        cache.set("b", b"2", None);
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn file_cache_reloads_index_and_purges_expired() {
        let dir = TempDir::new().unwrap();
        {
            let cache = Cache::open_dir(dir.path(), CacheConfig::default()).unwrap();
            cache.set("live", b"keep", None);
            cache.set("stale", b"drop", Some(Duration::from_millis(10)));
            cache.get("live");
        }
        std::thread::sleep(Duration::from_millis(30));

        let cache = Cache::open_dir(dir.path(), CacheConfig::default()).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entry("live").unwrap().access_count, 1);
        assert!(!dir.path().join("stale.cache").exists());
        assert_eq!(cache.get("live"), Some(b"keep".to_vec()));
    }

    #[test]
    fn durable_cache_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let cache = Cache::open_durable(dir.path(), CacheConfig::default()).unwrap();
            cache.set_typed("k", b"v", None, "analysis");
        }
        let cache = Cache::open_durable(dir.path(), CacheConfig::default()).unwrap();
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));
        assert_eq!(cache.stats().type_statistics["analysis"].count, 1);
    }

    #[test]
    fn failed_delete_keeps_entry_for_retry() {
        let backend = FlakyBackend::default();
        let fail = Arc::clone(&backend.fail_deletes);
        let cache = Cache::new(backend, small(20));
        cache.set("a", &[0; 10], None);
        cache.set("b", &[0; 10], None);

        fail.store(true, Ordering::SeqCst);
        assert!(!cache.remove("a"));
        assert!(cache.contains("a"));
        // Over budget, but nothing can be deleted: every entry stays reachable.
        cache.set("c", &[0; 10], None);
        assert_eq!(cache.len(), 3);

        fail.store(false, Ordering::SeqCst);
        cache.set("d", &[0; 10], None);
        assert!(!cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert!(cache.stats().total_size_bytes <= 20);
    }

    #[test]
    fn hits_defer_index_writes_until_flush() {
        let backend = FlakyBackend::default();
        let saves = Arc::clone(&backend.index_saves);
        let cache = Cache::new(backend, CacheConfig::default());
        cache.set("k", b"v", None);
        let after_set = saves.load(Ordering::SeqCst);

        for _ in 0..5 {
            assert!(cache.get("k").is_some());
        }
        assert_eq!(saves.load(Ordering::SeqCst), after_set);
        assert_eq!(cache.entry("k").unwrap().access_count, 5);

        cache.flush();
        assert_eq!(saves.load(Ordering::SeqCst), after_set + 1);
        cache.flush();
        assert_eq!(saves.load(Ordering::SeqCst), after_set + 1);
    }

    #[test]
    fn unusable_key_degrades_to_miss() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::open_dir(dir.path(), CacheConfig::default()).unwrap();
        assert!(!cache.set("../escape", b"x", None));
        assert_eq!(cache.get("../escape"), None);
    }
}

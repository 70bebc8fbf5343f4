//! Storage media behind the cache.
//!
//! A backend stores opaque payload bytes by key and persists the entry
//! index. It performs no expiry or eviction; [`Cache`](super::Cache) owns
//! that policy.

use dashmap::DashMap;

use super::{CacheEntry, CacheResult};

/// A medium holding cache payloads and the entry index.
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    /// Read a payload. `Ok(None)` if the key is absent.
    fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store or replace a payload.
    fn write(&self, key: &str, value: &[u8]) -> CacheResult<()>;

    /// Delete a payload. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every payload and the persisted index.
    fn clear(&self) -> CacheResult<()>;

    /// Load the persisted index. Empty if none was saved.
    fn load_index(&self) -> CacheResult<Vec<CacheEntry>>;

    /// Persist the index, replacing what was saved before.
    fn save_index(&self, entries: &[CacheEntry]) -> CacheResult<()>;

    /// Short name for logs.
    fn kind(&self) -> &'static str;
}

/// Volatile backend backed by a sharded hashmap. All data is lost on drop.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payloads.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl CacheBackend for MemoryBackend {
    fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    fn write(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.data.remove(key);
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        self.data.clear();
        Ok(())
    }

    fn load_index(&self) -> CacheResult<Vec<CacheEntry>> {
        Ok(Vec::new())
    }

    fn save_index(&self, _entries: &[CacheEntry]) -> CacheResult<()> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

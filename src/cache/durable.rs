//! ACID-durable cache medium backed by redb.
//!
//! Payloads and index entries live in two tables of one database file, so
//! a payload and its metadata survive crashes together.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::CacheError;

use super::backend::CacheBackend;
use super::{CacheEntry, CacheResult};

/// Payload bytes by cache key.
const PAYLOAD_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("payload");

/// JSON-encoded [`CacheEntry`] by cache key.
const INDEX_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("index");

/// Database file name inside the cache directory.
pub const DB_FILE: &str = "kg-cache.redb";

fn redb_err(op: &str, e: impl std::fmt::Display) -> CacheError {
    CacheError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

/// Cache medium storing payloads and the index in redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
pub struct DurableBackend {
    db: Arc<Database>,
}

impl DurableBackend {
    /// Open or create a durable cache in the given directory.
    pub fn open(data_dir: &Path) -> CacheResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| CacheError::Io {
            path: data_dir.display().to_string(),
            source: e,
        })?;
        let db_path = data_dir.join(DB_FILE);
        let db = Database::create(&db_path).map_err(|e| CacheError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create both tables up front so read transactions always find them.
        let txn = db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        txn.open_table(PAYLOAD_TABLE)
            .map_err(|e| redb_err("open_table", e))?;
        txn.open_table(INDEX_TABLE)
            .map_err(|e| redb_err("open_table", e))?;
        txn.commit().map_err(|e| redb_err("commit", e))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl CacheBackend for DurableBackend {
    fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let table = txn
            .open_table(PAYLOAD_TABLE)
            .map_err(|e| redb_err("open_table", e))?;
        let result = table.get(key).map_err(|e| redb_err("get", e))?;
        Ok(result.map(|guard| guard.value().to_vec()))
    }

    fn write(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        {
            let mut table = txn
                .open_table(PAYLOAD_TABLE)
                .map_err(|e| redb_err("open_table", e))?;
            table.insert(key, value).map_err(|e| redb_err("insert", e))?;
        }
        txn.commit().map_err(|e| redb_err("commit", e))
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        {
            let mut table = txn
                .open_table(PAYLOAD_TABLE)
                .map_err(|e| redb_err("open_table", e))?;
            table.remove(key).map_err(|e| redb_err("remove", e))?;
        }
        txn.commit().map_err(|e| redb_err("commit", e))
    }

    fn clear(&self) -> CacheResult<()> {
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        txn.delete_table(PAYLOAD_TABLE)
            .map_err(|e| redb_err("delete_table", e))?;
        txn.delete_table(INDEX_TABLE)
            .map_err(|e| redb_err("delete_table", e))?;
        txn.open_table(PAYLOAD_TABLE)
            .map_err(|e| redb_err("open_table", e))?;
        txn.open_table(INDEX_TABLE)
            .map_err(|e| redb_err("open_table", e))?;
        txn.commit().map_err(|e| redb_err("commit", e))
    }

    fn load_index(&self) -> CacheResult<Vec<CacheEntry>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let table = txn
            .open_table(INDEX_TABLE)
            .map_err(|e| redb_err("open_table", e))?;
        let mut entries = Vec::new();
        for item in table.iter().map_err(|e| redb_err("iter", e))? {
            let (_, value) = item.map_err(|e| redb_err("iter", e))?;
            let entry: CacheEntry =
                serde_json::from_slice(value.value()).map_err(|e| CacheError::CorruptIndex {
                    path: DB_FILE.to_string(),
                    message: e.to_string(),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn save_index(&self, entries: &[CacheEntry]) -> CacheResult<()> {
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        txn.delete_table(INDEX_TABLE)
            .map_err(|e| redb_err("delete_table", e))?;
        {
            let mut table = txn
                .open_table(INDEX_TABLE)
                .map_err(|e| redb_err("open_table", e))?;
            for entry in entries {
                let json = serde_json::to_vec(entry).map_err(|e| CacheError::Serialization {
                    message: e.to_string(),
                })?;
                table
                    .insert(entry.key.as_str(), json.as_slice())
                    .map_err(|e| redb_err("insert", e))?;
            }
        }
        txn.commit().map_err(|e| redb_err("commit", e))
    }

    fn kind(&self) -> &'static str {
        "redb"
    }
}

impl std::fmt::Debug for DurableBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableBackend").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn put_get_remove() {
        let dir = TempDir::new().unwrap();
        let backend = DurableBackend::open(dir.path()).unwrap();

        assert_eq!(backend.read("hello").unwrap(), None);
        backend.write("hello", b"world").unwrap();
        assert_eq!(backend.read("hello").unwrap(), Some(b"world".to_vec()));
        backend.delete("hello").unwrap();
        assert_eq!(backend.read("hello").unwrap(), None);
    }

    #[test]
    fn index_persists_across_reopens() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let entry = CacheEntry {
            key: "k".into(),
            created_at: now,
            expires_at: now,
            size_bytes: 5,
            data_type: "analysis".into(),
            access_count: 1,
            last_accessed: now,
        };
        {
            let backend = DurableBackend::open(dir.path()).unwrap();
            backend.write("k", b"value").unwrap();
            backend.save_index(std::slice::from_ref(&entry)).unwrap();
        }

        let backend = DurableBackend::open(dir.path()).unwrap();
        assert_eq!(backend.read("k").unwrap(), Some(b"value".to_vec()));
        assert_eq!(backend.load_index().unwrap(), vec![entry]);
    }

    #[test]
    fn clear_empties_both_tables() {
        let dir = TempDir::new().unwrap();
        let backend = DurableBackend::open(dir.path()).unwrap();
        backend.write("a", b"1").unwrap();
        backend.clear().unwrap();
        assert_eq!(backend.read("a").unwrap(), None);
        assert!(backend.load_index().unwrap().is_empty());
    }
}

//! Directory-backed cache medium.
//!
//! Layout: one `<key>.cache` blob per entry plus a `cache_metadata.json`
//! index mapping key → entry metadata.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::CacheError;

use super::backend::CacheBackend;
use super::{CacheEntry, CacheResult};

/// File name of the persisted index.
pub const METADATA_FILE: &str = "cache_metadata.json";

const PAYLOAD_EXT: &str = "cache";

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Cache medium storing each payload as a file in one directory.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open a cache directory, creating it if missing.
    pub fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the payload blob for `key`.
    pub fn payload_path(&self, key: &str) -> CacheResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(CacheError::InvalidKey { key: key.to_string() });
        }
        Ok(self.dir.join(format!("{key}.{PAYLOAD_EXT}")))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    fn remove_file(path: &Path) -> CacheResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

impl CacheBackend for FileBackend {
    fn read(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let path = self.payload_path(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        let path = self.payload_path(key)?;
        std::fs::write(&path, value).map_err(|e| io_error(&path, e))
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        Self::remove_file(&self.payload_path(key)?)
    }

    fn clear(&self) -> CacheResult<()> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| io_error(&self.dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == PAYLOAD_EXT) {
                Self::remove_file(&path)?;
            }
        }
        Self::remove_file(&self.metadata_path())
    }

    fn load_index(&self) -> CacheResult<Vec<CacheEntry>> {
        let path = self.metadata_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&path, e)),
        };
        let map: BTreeMap<String, CacheEntry> =
            serde_json::from_str(&text).map_err(|e| CacheError::CorruptIndex {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(map.into_values().collect())
    }

    fn save_index(&self, entries: &[CacheEntry]) -> CacheResult<()> {
        let map: BTreeMap<&str, &CacheEntry> =
            entries.iter().map(|e| (e.key.as_str(), e)).collect();
        let json = serde_json::to_vec_pretty(&map).map_err(|e| CacheError::Serialization {
            message: e.to_string(),
        })?;
        // Write-then-rename so a crash never leaves a truncated index.
        let path = self.metadata_path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn entry(key: &str) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            key: key.into(),
            created_at: now,
            expires_at: now,
            size_bytes: 3,
            data_type: "general".into(),
            access_count: 2,
            last_accessed: now,
        }
    }

    #[test]
    fn payloads_are_files() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.write("abc", b"xyz").unwrap();
        assert!(dir.path().join("abc.cache").exists());
        assert_eq!(backend.read("abc").unwrap(), Some(b"xyz".to_vec()));
        backend.delete("abc").unwrap();
        assert_eq!(backend.read("abc").unwrap(), None);
    }

    #[test]
    fn index_round_trips_as_keyed_json() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.save_index(&[entry("k1"), entry("k2")]).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join(METADATA_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["k1"]["access_count"], 2);
        assert_eq!(raw["k2"]["data_type"], "general");

        let loaded = backend.load_index().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn corrupt_index_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), b"{not json").unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(matches!(backend.load_index(), Err(CacheError::CorruptIndex { .. })));
    }

    #[test]
    fn path_escaping_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(matches!(backend.write("../evil", b"x"), Err(CacheError::InvalidKey { .. })));
        assert!(matches!(backend.read(""), Err(CacheError::InvalidKey { .. })));
    }

    #[test]
    fn clear_removes_blobs_and_index() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.write("a", b"1").unwrap();
        backend.save_index(&[entry("a")]).unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"other").unwrap();

        backend.clear().unwrap();
        assert!(!dir.path().join("a.cache").exists());
        assert!(!dir.path().join(METADATA_FILE).exists());
        assert!(dir.path().join("keep.txt").exists());
    }
}

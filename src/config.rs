//! Reasoner configuration, loadable from TOML.
//!
//! ```toml
//! rules_file = "rules.toml"
//!
//! [inference]
//! probability_threshold = 0.7
//!
//! [cache]
//! max_size_bytes = 1048576
//!
//! [storage]
//! backend = "file"
//! dir = "/var/cache/kg-reason"
//! ```
//!
//! Every section is optional and falls back to its defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CacheConfig};
use crate::error::{CacheError, ConfigError};
use crate::infer::InferenceConfig;
use crate::query::{PlannerConfig, QueryConfig};

/// Medium behind the result cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Volatile, lost on exit.
    #[default]
    Memory,
    /// `<key>.cache` blobs plus a JSON index in a directory.
    File,
    /// A single redb database file.
    Redb,
}

/// Where cached results live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Required for the file and redb backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Complete configuration of the reasoning core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    /// TOML or JSON rule file replacing the builtin rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
    pub inference: InferenceConfig,
    pub query: QueryConfig,
    pub planner: PlannerConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
}

impl ReasonerConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.inference.validate()?;
        self.query.validate()?;
        self.planner.validate()?;
        if self.cache.max_size_bytes == 0 {
            return Err(ConfigError::Invalid {
                message: "cache.max_size_bytes must be greater than 0".into(),
            });
        }
        if self.storage.backend != BackendKind::Memory && self.storage.dir.is_none() {
            return Err(ConfigError::Invalid {
                message: format!("storage.dir is required for the {:?} backend", self.storage.backend),
            });
        }
        Ok(())
    }

    /// Build the cache described by `storage` and `cache`.
    pub fn open_cache(&self) -> Result<Cache, CacheError> {
        let config = self.cache.clone();
        match (self.storage.backend, &self.storage.dir) {
            (BackendKind::File, Some(dir)) => Cache::open_dir(dir, config),
            (BackendKind::Redb, Some(dir)) => Cache::open_durable(dir, config),
            _ => Ok(Cache::in_memory(config)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: ReasonerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ReasonerConfig::default());
        assert_eq!(config.inference.probability_threshold, 0.6);
        assert_eq!(config.query.path_cutoff, 3);
        assert_eq!(config.planner.history_capacity, 100);
        assert_eq!(config.cache.default_ttl_secs, 43_200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_override() {
        let config: ReasonerConfig = toml::from_str(
            r#"
            [inference]
            max_hops = 4

            [storage]
            backend = "redb"
            dir = "/tmp/kg"
            "#,
        )
        .unwrap();
        assert_eq!(config.inference.max_hops, 4);
        assert_eq!(config.inference.min_confidence, 0.5);
        assert_eq!(config.storage.backend, BackendKind::Redb);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = ReasonerConfig::default();
        config.inference.probability_threshold = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = ReasonerConfig::default();
        config.storage.backend = BackendKind::File;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/kg.toml");
        let mut config = ReasonerConfig::default();
        config.cache.max_size_bytes = 4096;
        config.storage = StorageConfig {
            backend: BackendKind::File,
            dir: Some(tmp.path().join("cache")),
        };
        config.save(&path).unwrap();

        let loaded = ReasonerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let cache = loaded.open_cache().unwrap();
        assert_eq!(cache.config().max_size_bytes, 4096);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ReasonerConfig::load(Path::new("/nonexistent/kg.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

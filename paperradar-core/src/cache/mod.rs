//! Tiered cache: an in-process LRU hot tier over a persistent tier, with
//! TTLs chosen by how volatile the cached data is.

pub mod entry;
pub mod store;
pub mod tier;
pub mod ttl;

pub use entry::CacheEntry;
pub use store::{CacheStats, CacheWrite, TieredCache};
pub use tier::{FileTier, MemoryTier, PersistentTier, RemovalReport};
pub use ttl::{CacheCategory, TtlConfig, TtlPolicy};

use crate::clock::Clock;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which persistent tier backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// One JSON file per key under `CacheConfig::dir`.
    #[default]
    File,
    /// Process-local map; nothing survives a restart.
    Memory,
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Directory for the file backend. Defaults to `<data dir>/cache`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Hot tier capacity (default: 10000).
    #[serde(default = "default_max_memory_items")]
    pub max_memory_items: usize,
}

fn default_max_memory_items() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            dir: None,
            max_memory_items: default_max_memory_items(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_memory_items == 0 {
            warnings.push("cache.max_memory_items must be at least 1".to_string());
        }
        warnings
    }
}

impl TieredCache {
    /// Build a cache from configuration. `data_dir` supplies the file
    /// backend's location when `config.dir` is unset.
    pub fn from_config(
        config: &CacheConfig,
        ttl: &TtlConfig,
        data_dir: &Path,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let policy = TtlPolicy::from_config(ttl)?;
        if config.max_memory_items == 0 {
            return Err(ConfigError::Invalid {
                message: "cache.max_memory_items must be at least 1".into(),
            });
        }
        let persistent: Arc<dyn PersistentTier> = match config.backend {
            CacheBackend::File => {
                let dir = config
                    .dir
                    .clone()
                    .unwrap_or_else(|| data_dir.join("cache"));
                Arc::new(FileTier::new(dir))
            }
            CacheBackend::Memory => Arc::new(MemoryTier::new()),
        };
        Ok(TieredCache::new(
            persistent,
            policy,
            config.max_memory_items,
            clock,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use tempfile::TempDir;

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, CacheBackend::File);
        assert_eq!(config.max_memory_items, 10_000);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_cache_config_deserializes_partial() {
        let config: CacheConfig = serde_json::from_str(r#"{"backend": "memory"}"#).unwrap();
        assert_eq!(config.backend, CacheBackend::Memory);
        assert_eq!(config.max_memory_items, 10_000);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CacheConfig {
            max_memory_items: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 1);
        let result = TieredCache::from_config(
            &config,
            &TtlConfig::default(),
            Path::new("/tmp"),
            Arc::new(SystemClock),
        );
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_file_backend_uses_data_dir() {
        let dir = TempDir::new().unwrap();
        let cache = TieredCache::from_config(
            &CacheConfig::default(),
            &TtlConfig::default(),
            dir.path(),
            Arc::new(SystemClock),
        )
        .unwrap();
        cache
            .set("paper:1", &42, CacheWrite::new(CacheCategory::Citations))
            .await
            .unwrap();
        assert!(dir.path().join("cache").is_dir());
        assert_eq!(cache.get_stats().await.disk_items, 1);
    }
}

//! Persistent cache tiers.
//!
//! The persistent tier is bounded only by TTL expiry. Each implementation
//! provides per-key atomicity on its own; the store never locks around it.

use super::entry::CacheEntry;
use crate::error::CacheError;
use crate::persistence::{self, RecordRead};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Predicate used by bulk removal scans.
pub type EntryPredicate<'a> = &'a (dyn Fn(&CacheEntry) -> bool + Send + Sync);

/// Outcome of a bulk removal scan.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RemovalReport {
    /// Keys of the readable records that were removed.
    pub keys: Vec<String>,
    /// Unreadable records that were purged.
    pub unreadable: usize,
    /// Records the scan could not read or delete; they are left in place.
    pub failed: usize,
}

/// The larger, slower backing store behind the hot tier.
#[async_trait]
pub trait PersistentTier: Send + Sync {
    /// Read a record. Unparseable records are reported as `CacheError::Corrupt`.
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Write (or replace) a record.
    async fn store(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Remove a record, reporting whether one existed.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Full scan removing every record the predicate selects. When
    /// `purge_unreadable` is set, records that cannot be parsed are removed
    /// too.
    async fn remove_where(
        &self,
        predicate: EntryPredicate<'_>,
        purge_unreadable: bool,
    ) -> Result<RemovalReport, CacheError>;

    /// Number of records currently stored.
    async fn len(&self) -> Result<usize, CacheError>;
}

// ---------------------------------------------------------------------------
// File tier
// ---------------------------------------------------------------------------

/// One JSON file per key, named by the SHA-256 of the key.
#[derive(Debug, Clone)]
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }

    async fn record_paths(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl PersistentTier for FileTier {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        match persistence::read_record::<CacheEntry>(&path).await? {
            RecordRead::Parsed(entry) if entry.key == key => Ok(Some(entry)),
            RecordRead::Parsed(entry) => Err(CacheError::Corrupt {
                key: key.to_string(),
                message: format!("record holds key '{}'", entry.key),
            }),
            RecordRead::Missing => Ok(None),
            RecordRead::Unreadable(e) => Err(CacheError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.path_for(&entry.key);
        persistence::write_record(&path, entry).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(persistence::discard_record(&self.path_for(key)).await?)
    }

    async fn remove_where(
        &self,
        predicate: EntryPredicate<'_>,
        purge_unreadable: bool,
    ) -> Result<RemovalReport, CacheError> {
        let mut report = RemovalReport::default();
        for path in self.record_paths().await? {
            if let Err(e) = sweep_record(&path, predicate, purge_unreadable, &mut report).await {
                report.failed += 1;
                warn!(path = %path.display(), error = %e, "Cache record left in place");
            }
        }
        Ok(report)
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.record_paths().await?.len())
    }
}

/// One step of a removal scan. I/O errors are per-record; the caller keeps
/// scanning.
async fn sweep_record(
    path: &Path,
    predicate: EntryPredicate<'_>,
    purge_unreadable: bool,
    report: &mut RemovalReport,
) -> io::Result<()> {
    match persistence::read_record::<CacheEntry>(path).await? {
        RecordRead::Parsed(entry) => {
            if predicate(&entry) && persistence::discard_record(path).await? {
                report.keys.push(entry.key);
            }
        }
        RecordRead::Missing => {}
        RecordRead::Unreadable(e) => {
            debug!(path = %path.display(), error = %e, "Unreadable cache record");
            if purge_unreadable && persistence::discard_record(path).await? {
                report.unreadable += 1;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Memory tier
// ---------------------------------------------------------------------------

/// Process-local tier, for tests and deployments that opt out of disk.
#[derive(Debug, Default)]
pub struct MemoryTier {
    records: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistentTier for MemoryTier {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut stored = entry.clone();
        stored.hit_count = 0;
        self.records.write().await.insert(entry.key.clone(), stored);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.records.write().await.remove(key).is_some())
    }

    async fn remove_where(
        &self,
        predicate: EntryPredicate<'_>,
        _purge_unreadable: bool,
    ) -> Result<RemovalReport, CacheError> {
        let mut records = self.records.write().await;
        let keys: Vec<String> = records
            .values()
            .filter(|entry| predicate(entry))
            .map(|entry| entry.key.clone())
            .collect();
        for key in &keys {
            records.remove(key);
        }
        Ok(RemovalReport {
            keys,
            ..Default::default()
        })
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(key: &str, expires_at: f64) -> CacheEntry {
        CacheEntry {
            key: key.into(),
            value: json!({"k": key}),
            category: "citations".into(),
            created_at: 0.0,
            expires_at,
            hit_count: 0,
            volatility_hint: None,
        }
    }

    #[tokio::test]
    async fn test_file_tier_roundtrip() {
        let dir = TempDir::new().unwrap();
        let tier = FileTier::new(dir.path());

        tier.store(&entry("paper:abc", 100.0)).await.unwrap();
        let loaded = tier.load("paper:abc").await.unwrap().unwrap();
        assert_eq!(loaded.value, json!({"k": "paper:abc"}));
        assert_eq!(tier.len().await.unwrap(), 1);
        assert!(tier.load("paper:missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_tier_names_files_by_hash() {
        let dir = TempDir::new().unwrap();
        let tier = FileTier::new(dir.path());
        tier.store(&entry("weird/key with spaces?", 100.0))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].len(), 64 + ".json".len());
    }

    #[tokio::test]
    async fn test_file_tier_corrupt_record() {
        let dir = TempDir::new().unwrap();
        let tier = FileTier::new(dir.path());
        tier.store(&entry("paper:bad", 100.0)).await.unwrap();
        std::fs::write(tier.path_for("paper:bad"), b"garbage").unwrap();

        let err = tier.load("paper:bad").await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));

        // Pattern scans skip unreadable records unless asked to purge them.
        let report = tier.remove_where(&|_| true, false).await.unwrap();
        assert_eq!(report, RemovalReport::default());
        let report = tier.remove_where(&|_| false, true).await.unwrap();
        assert_eq!(report.unreadable, 1);
        assert_eq!(tier.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_tier_remove_where() {
        let dir = TempDir::new().unwrap();
        let tier = FileTier::new(dir.path());
        tier.store(&entry("paper:1", 10.0)).await.unwrap();
        tier.store(&entry("paper:2", 50.0)).await.unwrap();
        tier.store(&entry("trending:week", 10.0)).await.unwrap();

        let mut report = tier
            .remove_where(&|e| e.key.contains("paper:"), false)
            .await
            .unwrap();
        report.keys.sort();
        assert_eq!(report.keys, vec!["paper:1".to_string(), "paper:2".to_string()]);
        assert!(tier.load("trending:week").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_tier_scan_continues_past_bad_record() {
        let dir = TempDir::new().unwrap();
        let tier = FileTier::new(dir.path());
        tier.store(&entry("paper:1", 10.0)).await.unwrap();
        tier.store(&entry("paper:2", 10.0)).await.unwrap();
        // A directory with a record name cannot be read as a file.
        std::fs::create_dir(dir.path().join("0000.json")).unwrap();

        let report = tier.remove_where(&|_| true, true).await.unwrap();
        assert_eq!(report.keys.len(), 2);
        assert_eq!(report.failed, 1);
        assert!(tier.load("paper:1").await.unwrap().is_none());
        assert!(tier.load("paper:2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_tier_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let tier = FileTier::new(dir.path().join("never-created"));
        assert_eq!(tier.len().await.unwrap(), 0);
        let report = tier.remove_where(&|_| true, true).await.unwrap();
        assert!(report.keys.is_empty());
        assert!(!tier.remove("nothing").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_tier() {
        let tier = MemoryTier::new();
        tier.store(&entry("a", 10.0)).await.unwrap();
        tier.store(&entry("b", 20.0)).await.unwrap();
        assert_eq!(tier.len().await.unwrap(), 2);
        assert!(tier.remove("a").await.unwrap());
        assert!(!tier.remove("a").await.unwrap());
        let report = tier
            .remove_where(&|e| e.expires_at <= 20.0, false)
            .await
            .unwrap();
        assert_eq!(report.keys, vec!["b".to_string()]);
        assert_eq!(tier.len().await.unwrap(), 0);
    }
}

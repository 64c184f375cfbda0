//! Two-tier cache store: a bounded LRU hot tier over a persistent tier.
//!
//! The hot tier index is the only shared mutable state and lives behind a
//! short-lived mutex that is never held across persistent-tier I/O.

use super::entry::CacheEntry;
use super::ttl::TtlPolicy;
use super::tier::PersistentTier;
use crate::clock::Clock;
use crate::error::CacheError;
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// How a value should be written: its category plus optional TTL inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub category: String,
    /// Explicit TTL; skips the policy entirely when set.
    pub ttl_secs: Option<u64>,
    /// Citation velocity (citations/week) of the paper the value describes.
    pub velocity_hint: Option<i64>,
    /// Age in days of the paper the value describes.
    pub age_days_hint: Option<i64>,
}

impl CacheWrite {
    pub fn new(category: impl AsRef<str>) -> Self {
        Self {
            category: category.as_ref().to_string(),
            ttl_secs: None,
            velocity_hint: None,
            age_days_hint: None,
        }
    }

    pub fn ttl(mut self, secs: u64) -> Self {
        self.ttl_secs = Some(secs);
        self
    }

    pub fn velocity(mut self, citations_per_week: i64) -> Self {
        self.velocity_hint = Some(citations_per_week);
        self
    }

    pub fn age_days(mut self, days: i64) -> Self {
        self.age_days_hint = Some(days);
        self
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub evictions: u64,
    /// `hits / (hits + misses)`, rounded to four decimals.
    pub hit_rate: f64,
    pub memory_items: usize,
    pub disk_items: usize,
    pub persist_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    evictions: AtomicU64,
    persist_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Memory,
    Disk,
}

/// Tiered key/value cache with volatility-aware TTLs.
pub struct TieredCache {
    hot: Mutex<LruCache<String, CacheEntry>>,
    persistent: Arc<dyn PersistentTier>,
    ttl: TtlPolicy,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl TieredCache {
    pub fn new(
        persistent: Arc<dyn PersistentTier>,
        ttl: TtlPolicy,
        max_memory_items: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_memory_items).unwrap_or(NonZeroUsize::MIN);
        Self {
            hot: Mutex::new(LruCache::new(capacity)),
            persistent,
            ttl,
            clock,
            counters: Counters::default(),
        }
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    fn hot(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.hot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a raw JSON value, checking the hot tier first.
    pub async fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        match self.lookup(key).await {
            Some((value, tier)) => {
                self.record_hit(tier);
                Some(value)
            }
            None => {
                Counters::bump(&self.counters.misses);
                None
            }
        }
    }

    /// Look up a value and deserialize it as `T`.
    ///
    /// A stored value that does not fit `T` is treated as corrupt: it is
    /// deleted and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some((value, tier)) = self.lookup(key).await else {
            Counters::bump(&self.counters.misses);
            return None;
        };
        match serde_json::from_value::<T>(value) {
            Ok(typed) => {
                self.record_hit(tier);
                Some(typed)
            }
            Err(e) => {
                warn!(key, error = %e, "Cached value has unexpected shape, discarding");
                Counters::bump(&self.counters.misses);
                self.delete(key).await;
                None
            }
        }
    }

    fn record_hit(&self, tier: Tier) {
        Counters::bump(&self.counters.hits);
        match tier {
            Tier::Memory => Counters::bump(&self.counters.memory_hits),
            Tier::Disk => Counters::bump(&self.counters.disk_hits),
        }
    }

    /// Find a live value without touching hit/miss counters. Expired and
    /// corrupt entries found on the way are removed.
    async fn lookup(&self, key: &str) -> Option<(serde_json::Value, Tier)> {
        let now = self.clock.epoch_secs();

        let hot_expired = {
            let mut hot = self.hot();
            let live = hot.get_mut(key).map(|entry| {
                if entry.is_expired(now) {
                    None
                } else {
                    entry.hit_count += 1;
                    Some(entry.value.clone())
                }
            });
            match live {
                Some(Some(value)) => return Some((value, Tier::Memory)),
                Some(None) => {
                    hot.pop(key);
                    true
                }
                None => false,
            }
        };
        if hot_expired {
            self.remove_persistent(key).await;
            return None;
        }

        match self.persistent.load(key).await {
            Ok(Some(entry)) if entry.is_expired(now) => {
                self.remove_persistent(key).await;
                None
            }
            Ok(Some(mut entry)) => {
                entry.hit_count += 1;
                let value = self.promote(entry, now);
                Some((value, Tier::Disk))
            }
            Ok(None) => None,
            Err(CacheError::Corrupt { message, .. }) => {
                warn!(key, error = %message, "Corrupt cache record, discarding");
                self.remove_persistent(key).await;
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Persistent cache read failed");
                None
            }
        }
    }

    /// Move a persistent record into the hot tier. If a concurrent `set`
    /// already placed a live entry there, that newer entry wins.
    fn promote(&self, entry: CacheEntry, now: f64) -> serde_json::Value {
        let mut hot = self.hot();
        let current = hot
            .get_mut(&entry.key)
            .filter(|current| !current.is_expired(now))
            .map(|current| {
                current.hit_count += 1;
                current.value.clone()
            });
        if let Some(value) = current {
            return value;
        }
        let value = entry.value.clone();
        self.insert_hot(&mut hot, entry);
        value
    }

    fn insert_hot(&self, hot: &mut LruCache<String, CacheEntry>, entry: CacheEntry) {
        let key = entry.key.clone();
        if let Some((evicted, _)) = hot.push(key.clone(), entry)
            && evicted != key
        {
            Counters::bump(&self.counters.evictions);
            debug!(key = %evicted, "Evicted least recently used cache entry");
        }
    }

    async fn remove_persistent(&self, key: &str) -> bool {
        match self.persistent.remove(key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key, error = %e, "Persistent cache delete failed");
                false
            }
        }
    }

    /// Store a value in both tiers.
    ///
    /// Fails only when the value cannot be represented as JSON. A failed
    /// persistent write is logged and counted; the hot tier keeps the value.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        write: CacheWrite,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        let ttl_secs = write.ttl_secs.unwrap_or_else(|| {
            self.ttl
                .get_ttl(&write.category, write.velocity_hint, write.age_days_hint)
        });
        let entry = CacheEntry::new(
            key,
            value,
            write.category,
            self.clock.epoch_secs(),
            ttl_secs,
            write.velocity_hint,
        );

        {
            let mut hot = self.hot();
            self.insert_hot(&mut hot, entry.clone());
        }

        if let Err(e) = self.persistent.store(&entry).await {
            Counters::bump(&self.counters.persist_failures);
            warn!(key, error = %e, "Failed to persist cache entry, serving from memory only");
        }
        Ok(())
    }

    /// Remove a key from both tiers. Returns whether anything was removed.
    pub async fn delete(&self, key: &str) -> bool {
        let in_memory = self.hot().pop(key).is_some();
        let on_disk = self.remove_persistent(key).await;
        in_memory || on_disk
    }

    /// Remove every key containing `pattern` from both tiers.
    ///
    /// Scans the whole persistent tier; keep this off request paths.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let removed = self.invalidate_matching(|key| key.contains(pattern)).await;
        debug!(pattern, removed, "Invalidated cache pattern");
        removed
    }

    /// Remove every key the predicate selects from both tiers. Same cost as
    /// `invalidate_pattern`.
    pub async fn invalidate_matching<P>(&self, matches: P) -> usize
    where
        P: Fn(&str) -> bool + Send + Sync,
    {
        let mut removed: HashSet<String> = {
            let mut hot = self.hot();
            let keys: Vec<String> = hot
                .iter()
                .filter(|(k, _)| matches(k))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &keys {
                hot.pop(key);
            }
            keys.into_iter().collect()
        };

        match self
            .persistent
            .remove_where(&|entry| matches(&entry.key), false)
            .await
        {
            Ok(report) => {
                if report.failed > 0 {
                    warn!(failed = report.failed, "Some cache records could not be invalidated");
                }
                removed.extend(report.keys);
            }
            Err(e) => warn!(error = %e, "Persistent cache invalidation failed"),
        }
        removed.len()
    }

    /// Remove every expired entry from both tiers, plus unreadable records.
    pub async fn clear_expired(&self) -> usize {
        let now = self.clock.epoch_secs();
        let mut removed: HashSet<String> = {
            let mut hot = self.hot();
            let keys: Vec<String> = hot
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &keys {
                hot.pop(key);
            }
            keys.into_iter().collect()
        };

        let mut unreadable = 0;
        match self
            .persistent
            .remove_where(&|entry| entry.is_expired(now), true)
            .await
        {
            Ok(report) => {
                if report.failed > 0 {
                    warn!(failed = report.failed, "Some expired cache records could not be removed");
                }
                removed.extend(report.keys);
                unreadable = report.unreadable;
            }
            Err(e) => warn!(error = %e, "Persistent cache expiry sweep failed"),
        }

        let total = removed.len() + unreadable;
        info!(removed = total, "Cleared expired cache entries");
        total
    }

    /// Pre-populate keys that are currently absent.
    ///
    /// Returns how many keys were loaded and stored. Loader failures and
    /// `None` results are skipped.
    pub async fn warm<F, Fut, E>(&self, items: Vec<(String, CacheWrite)>, loader: F) -> usize
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Option<serde_json::Value>, E>>,
        E: std::fmt::Display,
    {
        let mut warmed = 0;
        for (key, write) in items {
            if self.lookup(&key).await.is_some() {
                continue;
            }
            match loader(key.clone()).await {
                Ok(Some(value)) => match self.set(&key, &value, write).await {
                    Ok(()) => warmed += 1,
                    Err(e) => warn!(key = %key, error = %e, "Cache warming store failed"),
                },
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Cache warming failed"),
            }
        }
        warmed
    }

    /// Counter snapshot plus current tier sizes.
    pub async fn get_stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            (hits as f64 / (hits + misses) as f64 * 10_000.0).round() / 10_000.0
        };
        let memory_items = self.hot().len();
        let disk_items = match self.persistent.len().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Could not count persistent cache records");
                0
            }
        };
        CacheStats {
            hits,
            misses,
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            hit_rate,
            memory_items,
            disk_items,
            persist_failures: self.counters.persist_failures.load(Ordering::Relaxed),
        }
    }

    /// Hit count recorded for a key in the hot tier, without touching its
    /// recency.
    pub fn hot_hit_count(&self, key: &str) -> Option<u64> {
        self.hot().peek(key).map(|entry| entry.hit_count)
    }
}

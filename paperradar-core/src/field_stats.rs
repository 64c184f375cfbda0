//! Per-category citation statistics used to field-normalize raw counts.
//!
//! Stats are recomputed from scratch over a lookback window and cached for
//! several hours; a computed `FieldStats` is an immutable snapshot.

use crate::cache::{CacheCategory, CacheWrite, TieredCache};
use crate::clock::Clock;
use crate::error::RepositoryError;
use crate::models::PaperMetrics;
use crate::repository::PaperRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of percentile points kept per metric (0th through 99th).
pub const PERCENTILE_POINTS: usize = 100;

/// Default lookback window for field statistics, in days.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;

/// Normalization reference for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub category: String,
    /// Index `i` holds the i-th percentile of citation counts.
    pub citation_percentiles: Vec<f64>,
    /// Index `i` holds the i-th percentile of weekly citation velocity.
    pub velocity_percentiles: Vec<f64>,
    pub mean_citations: f64,
    /// Population standard deviation, never below 1.0.
    pub std_citations: f64,
    pub sample_size: usize,
}

impl FieldStats {
    /// Stats for a category with no papers in the window.
    pub fn empty(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            citation_percentiles: vec![0.0; PERCENTILE_POINTS],
            velocity_percentiles: vec![0.0; PERCENTILE_POINTS],
            mean_citations: 0.0,
            std_citations: 1.0,
            sample_size: 0,
        }
    }

    pub fn from_metrics(category: impl Into<String>, metrics: &[PaperMetrics]) -> Self {
        if metrics.is_empty() {
            return Self::empty(category);
        }
        let citations: Vec<f64> = metrics.iter().map(|m| m.citation_count as f64).collect();
        let velocities: Vec<f64> = metrics
            .iter()
            .map(|m| m.citation_velocity_7d as f64)
            .collect();

        let n = citations.len() as f64;
        let mean = citations.iter().sum::<f64>() / n;
        let variance = citations.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;

        Self {
            category: category.into(),
            citation_percentiles: percentiles(&citations),
            velocity_percentiles: percentiles(&velocities),
            mean_citations: mean,
            std_citations: variance.sqrt().max(1.0),
            sample_size: metrics.len(),
        }
    }

    /// No papers backed these stats; callers should fall back to baselines.
    pub fn is_empty(&self) -> bool {
        self.sample_size == 0
    }

    pub fn citation_rank(&self, citations: f64) -> f64 {
        if self.is_empty() {
            return 0.5;
        }
        percentile_rank(citations, &self.citation_percentiles)
    }

    pub fn velocity_rank(&self, velocity: f64) -> f64 {
        if self.is_empty() {
            return 0.5;
        }
        percentile_rank(velocity, &self.velocity_percentiles)
    }

    /// Citation count at percentile `p` (0..=99), if present.
    pub fn citation_percentile(&self, p: usize) -> Option<f64> {
        self.citation_percentiles.get(p).copied()
    }
}

/// The 0th..99th percentiles of `values`, interpolating linearly between
/// closest ranks.
pub fn percentiles(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return vec![0.0; PERCENTILE_POINTS];
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last = (sorted.len() - 1) as f64;

    (0..PERCENTILE_POINTS)
        .map(|p| {
            let position = p as f64 / 100.0 * last;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            (sorted[lower] + (sorted[upper] - sorted[lower]) * fraction).min(sorted[upper])
        })
        .collect()
}

/// Fraction of the percentile table lying strictly below `value`: `i / 100`
/// for the smallest `i` with `value <= percentiles[i]`, or 1.0 past the top.
/// An empty array yields a neutral 0.5.
pub fn percentile_rank(value: f64, percentiles: &[f64]) -> f64 {
    if percentiles.is_empty() {
        return 0.5;
    }
    percentiles
        .iter()
        .position(|p| value <= *p)
        .map_or(1.0, |i| i as f64 / 100.0)
}

/// Computes and caches `FieldStats` per (category, lookback window).
pub struct FieldStatsAggregator {
    repo: Arc<dyn PaperRepository>,
    cache: Arc<TieredCache>,
    clock: Arc<dyn Clock>,
}

impl FieldStatsAggregator {
    pub fn new(
        repo: Arc<dyn PaperRepository>,
        cache: Arc<TieredCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, cache, clock }
    }

    pub fn cache_key(category: &str, days: i64) -> String {
        format!("field_stats:{category}:{days}")
    }

    /// Cached stats for a category, computing them on a miss.
    ///
    /// Zero-sample stats are returned but not cached, so a category that
    /// gains papers is picked up on the next call.
    pub async fn get(&self, category: &str, days: i64) -> Result<Arc<FieldStats>, RepositoryError> {
        let key = Self::cache_key(category, days);
        if let Some(stats) = self.cache.get::<FieldStats>(&key).await {
            return Ok(Arc::new(stats));
        }
        self.refresh(category, days).await
    }

    /// Recompute stats from the repository and overwrite the cached copy.
    pub async fn refresh(
        &self,
        category: &str,
        days: i64,
    ) -> Result<Arc<FieldStats>, RepositoryError> {
        let since = self.clock.today() - chrono::Duration::days(days);
        let metrics = self.repo.category_metrics(category, since).await?;
        let stats = FieldStats::from_metrics(category, &metrics);
        debug!(
            category,
            days,
            sample_size = stats.sample_size,
            "Computed field statistics"
        );

        if !stats.is_empty() {
            let key = Self::cache_key(category, days);
            if let Err(e) = self
                .cache
                .set(&key, &stats, CacheWrite::new(CacheCategory::FieldStatistics))
                .await
            {
                warn!(category, error = %e, "Failed to cache field statistics");
            }
        }
        Ok(Arc::new(stats))
    }
}

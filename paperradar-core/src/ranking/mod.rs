//! Field-normalized multi-factor paper ranking.
//!
//! Seven components, each in [0, 1], are combined with fixed weights and the
//! sum is scaled by an adaptive freshness boost. Missing inputs never fail a
//! score; each component has a documented default instead.

pub mod components;

pub use components::{FreshnessParams, RepoQuality};

use crate::cache::{CacheCategory, CacheWrite, TieredCache};
use crate::clock::Clock;
use crate::error::{ConfigError, RepositoryError};
use crate::field_stats::{DEFAULT_LOOKBACK_DAYS, FieldStats, FieldStatsAggregator};
use crate::models::{Paper, PaperMetrics};
use crate::repository::PaperRepository;
use components::round4;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

const AUTHOR_CREDIBILITY_TTL_SECS: u64 = 7 * 86_400;
const REPO_QUALITY_TTL_SECS: u64 = 86_400;

/// Component weights. Must be non-negative and sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub citation_momentum: f64,
    pub implementation_quality: f64,
    pub author_credibility: f64,
    pub novelty: f64,
    pub reproducibility: f64,
    pub community_engagement: f64,
    pub recency: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            citation_momentum: 0.25,
            implementation_quality: 0.20,
            author_credibility: 0.15,
            novelty: 0.15,
            reproducibility: 0.10,
            community_engagement: 0.10,
            recency: 0.05,
        }
    }
}

impl RankingWeights {
    fn as_array(&self) -> [f64; 7] {
        [
            self.citation_momentum,
            self.implementation_quality,
            self.author_credibility,
            self.novelty,
            self.reproducibility,
            self.community_engagement,
            self.recency,
        ]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

/// How novelty is scored. Fixed when the engine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoveltyBackend {
    /// Compare cached paper embeddings; papers without one use keywords.
    #[default]
    Embeddings,
    /// Keyword-diversity heuristic only.
    KeywordOnly,
}

/// Ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub weights: RankingWeights,
    pub freshness: FreshnessParams,
    /// Daily decay rate of the recency component.
    pub recency_decay_rate: f64,
    /// Age in days at which recency drops to zero.
    pub recency_cutoff_days: i64,
    /// Lookback window for field statistics.
    pub field_stats_days: i64,
    pub novelty_backend: NoveltyBackend,
    /// Recent same-category papers compared against for novelty.
    pub novelty_comparison_limit: usize,
    /// Median weekly citation velocity per category, used when a field has
    /// no statistics.
    pub field_baselines: BTreeMap<String, f64>,
    pub default_baseline: f64,
    /// Papers scored concurrently by `recalculate_scores`.
    pub batch_concurrency: usize,
    /// Scores above this are logged by the batch job.
    pub high_score_threshold: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        let field_baselines = [
            ("cs.AI", 15.0),
            ("cs.LG", 20.0),
            ("cs.CV", 25.0),
            ("cs.CL", 18.0),
            ("cs.NE", 8.0),
            ("stat.ML", 12.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            weights: RankingWeights::default(),
            freshness: FreshnessParams::default(),
            recency_decay_rate: 0.03,
            recency_cutoff_days: 90,
            field_stats_days: DEFAULT_LOOKBACK_DAYS,
            novelty_backend: NoveltyBackend::default(),
            novelty_comparison_limit: 100,
            field_baselines,
            default_baseline: 10.0,
            batch_concurrency: 8,
            high_score_threshold: 0.8,
        }
    }
}

impl RankingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.weights.as_array().iter().any(|w| *w < 0.0) {
            return invalid("ranking.weights must be non-negative".into());
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return invalid(format!("ranking.weights must sum to 1.0 (got {sum:.4})"));
        }
        if self.freshness.max_boost < 1.0 || self.freshness.no_traction_cap < 1.0 {
            return invalid("ranking.freshness boosts must be at least 1.0".into());
        }
        if self.freshness.window_days <= 0 {
            return invalid("ranking.freshness.window_days must be positive".into());
        }
        if self.recency_decay_rate < 0.0 {
            return invalid("ranking.recency_decay_rate must be non-negative".into());
        }
        if self.field_stats_days <= 0 {
            return invalid("ranking.field_stats_days must be positive".into());
        }
        if self.batch_concurrency == 0 {
            return invalid("ranking.batch_concurrency must be at least 1".into());
        }
        if self.default_baseline <= 0.0 || self.field_baselines.values().any(|b| *b <= 0.0) {
            return invalid("ranking baselines must be positive".into());
        }
        Ok(())
    }

    pub fn baseline_for(&self, category: &str) -> f64 {
        self.field_baselines
            .get(category)
            .copied()
            .unwrap_or(self.default_baseline)
    }
}

/// Per-component result of scoring one paper. Values are rounded to four
/// decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperScoreBreakdown {
    pub paper_id: String,
    pub total_score: f64,
    pub citation_momentum: f64,
    pub implementation_quality: f64,
    pub author_credibility: f64,
    pub novelty: f64,
    pub reproducibility: f64,
    pub community_engagement: f64,
    pub recency: f64,
    pub field_percentile: f64,
    /// Multiplier applied to the weighted sum.
    pub freshness_boost: f64,
}

/// Aggregate counters of a batch scoring run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalcStats {
    pub processed: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Scores papers against their field.
pub struct RankingEngine {
    repo: Arc<dyn PaperRepository>,
    cache: Arc<TieredCache>,
    field_stats: Arc<FieldStatsAggregator>,
    clock: Arc<dyn Clock>,
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(
        repo: Arc<dyn PaperRepository>,
        cache: Arc<TieredCache>,
        field_stats: Arc<FieldStatsAggregator>,
        clock: Arc<dyn Clock>,
        config: RankingConfig,
    ) -> Self {
        Self {
            repo,
            cache,
            field_stats,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn novelty_backend(&self) -> NoveltyBackend {
        self.config.novelty_backend
    }

    /// Score one paper. `metrics` overrides `paper.metrics` when given.
    pub async fn calculate_paper_score(
        &self,
        paper: &Paper,
        metrics: Option<&PaperMetrics>,
    ) -> PaperScoreBreakdown {
        let stats = self.field_stats_or_empty(&paper.primary_category).await;
        self.score_with_stats(paper, metrics.or(paper.metrics.as_ref()), &stats)
            .await
    }

    async fn field_stats_or_empty(&self, category: &str) -> Arc<FieldStats> {
        match self
            .field_stats
            .get(category, self.config.field_stats_days)
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                warn!(category, error = %e, "Field statistics unavailable, using baselines");
                Arc::new(FieldStats::empty(category))
            }
        }
    }

    async fn score_with_stats(
        &self,
        paper: &Paper,
        metrics: Option<&PaperMetrics>,
        stats: &FieldStats,
    ) -> PaperScoreBreakdown {
        let today = self.clock.today();
        let days_old = paper.age_days(today);

        // Cache-backed components are independent of each other.
        let (history, implementation_quality, author_credibility, novelty) = futures::join!(
            self.citation_history(&paper.id),
            self.implementation_quality(paper),
            self.author_credibility(paper),
            self.novelty(paper),
        );
        let citation_momentum = components::citation_momentum(
            metrics,
            &history,
            stats,
            self.config.baseline_for(&paper.primary_category),
        );
        let reproducibility = components::reproducibility(paper);
        let community_engagement = components::community_engagement(metrics);
        let recency = components::recency(
            days_old,
            self.config.recency_decay_rate,
            self.config.recency_cutoff_days,
        );
        let field_percentile = components::field_percentile(metrics, stats);
        let freshness_boost =
            components::freshness_boost(days_old, metrics, &self.config.freshness);

        let w = &self.config.weights;
        let weighted = w.citation_momentum * citation_momentum
            + w.implementation_quality * implementation_quality
            + w.author_credibility * author_credibility
            + w.novelty * novelty
            + w.reproducibility * reproducibility
            + w.community_engagement * community_engagement
            + w.recency * recency;
        let total_score = (weighted * freshness_boost).clamp(0.0, 1.0);

        PaperScoreBreakdown {
            paper_id: paper.id.clone(),
            total_score: round4(total_score),
            citation_momentum: round4(citation_momentum),
            implementation_quality: round4(implementation_quality),
            author_credibility: round4(author_credibility),
            novelty: round4(novelty),
            reproducibility: round4(reproducibility),
            community_engagement: round4(community_engagement),
            recency: round4(recency),
            field_percentile: round4(field_percentile),
            freshness_boost: round4(freshness_boost),
        }
    }

    /// Weekly citation counts written by enrichment, oldest first.
    async fn citation_history(&self, paper_id: &str) -> Vec<f64> {
        self.cache
            .get::<Vec<f64>>(&format!("citation_history:{paper_id}"))
            .await
            .unwrap_or_default()
    }

    /// Best implementation wins; a strong repo is not diluted by weak ones.
    async fn implementation_quality(&self, paper: &Paper) -> f64 {
        let now = self.clock.now();
        let mut best: f64 = 0.0;
        for implementation in &paper.implementations {
            let quality = self.repo_quality(&implementation.repo_url).await;
            best = best.max(components::implementation_score(
                implementation,
                &quality,
                now,
            ));
        }
        best
    }

    async fn repo_quality(&self, repo_url: &str) -> RepoQuality {
        let key = format!("repo_quality:{repo_url}");
        if let Some(quality) = self.cache.get::<RepoQuality>(&key).await {
            return quality;
        }
        let quality = RepoQuality::default();
        let write = CacheWrite::new(CacheCategory::Implementations).ttl(REPO_QUALITY_TTL_SECS);
        if let Err(e) = self.cache.set(&key, &quality, write).await {
            warn!(repo_url, error = %e, "Failed to cache repository quality");
        }
        quality
    }

    async fn author_credibility(&self, paper: &Paper) -> f64 {
        let key = format!("author_credibility:{}", paper.id);
        if let Some(score) = self.cache.get::<f64>(&key).await {
            return score;
        }
        let score = components::author_credibility(&paper.authors);
        if !paper.authors.is_empty() {
            let write =
                CacheWrite::new(CacheCategory::RankingSignals).ttl(AUTHOR_CREDIBILITY_TTL_SECS);
            if let Err(e) = self.cache.set(&key, &score, write).await {
                warn!(paper_id = %paper.id, error = %e, "Failed to cache author credibility");
            }
        }
        score
    }

    async fn novelty(&self, paper: &Paper) -> f64 {
        let key = format!("novelty:{}", paper.id);
        if let Some(score) = self.cache.get::<f64>(&key).await {
            return score;
        }

        let embedding = match self.config.novelty_backend {
            NoveltyBackend::Embeddings => self.embedding(&paper.id).await,
            NoveltyBackend::KeywordOnly => None,
        };
        let score = match embedding {
            Some(embedding) => {
                let recent = self.recent_embeddings(paper).await;
                components::embedding_novelty(&embedding, &recent)
            }
            None => components::keyword_novelty(&paper.abstract_text),
        };

        let write = CacheWrite::new(CacheCategory::RankingSignals);
        if let Err(e) = self.cache.set(&key, &score, write).await {
            warn!(paper_id = %paper.id, error = %e, "Failed to cache novelty");
        }
        score
    }

    async fn embedding(&self, paper_id: &str) -> Option<Vec<f64>> {
        self.cache
            .get::<Vec<f64>>(&format!("embedding:{paper_id}"))
            .await
            .filter(|e| !e.is_empty())
    }

    async fn recent_embeddings(&self, paper: &Paper) -> Vec<Vec<f64>> {
        let ids = match self
            .repo
            .recent_paper_ids(
                &paper.primary_category,
                &paper.id,
                self.config.novelty_comparison_limit,
            )
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(paper_id = %paper.id, error = %e, "Could not list comparison papers");
                return Vec::new();
            }
        };
        let mut embeddings = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(embedding) = self.embedding(&id).await {
                embeddings.push(embedding);
            }
        }
        embeddings
    }

    /// Rescore every paper published within the lookback window and store
    /// each `total_score`. Individual failures are counted, not fatal; only
    /// failing to list the papers is an error.
    pub async fn recalculate_scores(
        &self,
        category: Option<&str>,
        lookback_days: i64,
    ) -> Result<RecalcStats, RepositoryError> {
        let since = self.clock.today() - chrono::Duration::days(lookback_days);
        let papers = self.repo.papers_since(since, category).await?;
        info!(
            papers = papers.len(),
            category = category.unwrap_or("all"),
            lookback_days,
            "Calculating ranking scores"
        );

        let mut field_stats: HashMap<String, Arc<FieldStats>> = HashMap::new();
        for paper in &papers {
            if !field_stats.contains_key(&paper.primary_category) {
                let stats = self.field_stats_or_empty(&paper.primary_category).await;
                field_stats.insert(paper.primary_category.clone(), stats);
            }
        }

        let mut stats = RecalcStats {
            processed: papers.len(),
            ..Default::default()
        };
        let field_stats = &field_stats;
        let mut results = futures::stream::iter(papers.iter())
            .map(|paper| async move {
                let metrics = paper.metrics.clone().unwrap_or_default();
                let category_stats = field_stats
                    .get(&paper.primary_category)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(FieldStats::empty(&paper.primary_category)));
                let breakdown = self
                    .score_with_stats(paper, Some(&metrics), &category_stats)
                    .await;
                let stored = self
                    .repo
                    .update_rank_score(&paper.id, breakdown.total_score)
                    .await;
                (paper, breakdown, stored)
            })
            .buffer_unordered(self.config.batch_concurrency.max(1));

        while let Some((paper, breakdown, stored)) = results.next().await {
            match stored {
                Ok(()) => {
                    stats.updated += 1;
                    if breakdown.total_score > self.config.high_score_threshold {
                        info!(
                            arxiv_id = %paper.arxiv_id,
                            score = breakdown.total_score,
                            momentum = breakdown.citation_momentum,
                            novelty = breakdown.novelty,
                            "High-scoring paper"
                        );
                    }
                    debug!(paper_id = %paper.id, score = breakdown.total_score, "Scored paper");
                }
                Err(e) => {
                    stats.errors += 1;
                    warn!(arxiv_id = %paper.arxiv_id, error = %e, "Failed to store ranking score");
                }
            }
        }

        info!(
            processed = stats.processed,
            updated = stats.updated,
            errors = stats.errors,
            "Ranking calculation complete"
        );
        Ok(stats)
    }
}

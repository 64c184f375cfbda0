//! Trending paper lists and the cache invalidation that goes with them.

use crate::cache::{CacheCategory, CacheWrite, TieredCache};
use crate::clock::Clock;
use crate::error::RepositoryError;
use crate::models::Paper;
use crate::repository::PaperRepository;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// How far back a trending list looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Day,
    #[default]
    Week,
    Month,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
        }
    }

    /// Shorter windows churn faster, so their lists expire sooner.
    pub fn ttl_secs(&self) -> u64 {
        match self {
            Self::Day => 300,
            Self::Week => 600,
            Self::Month => 3600,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(format!(
                "unknown timeframe '{other}' (expected day, week or month)"
            )),
        }
    }
}

/// Serves ranked paper lists, caching only the ordered ids.
pub struct TrendingService {
    repo: Arc<dyn PaperRepository>,
    cache: Arc<TieredCache>,
    clock: Arc<dyn Clock>,
}

impl TrendingService {
    pub fn new(
        repo: Arc<dyn PaperRepository>,
        cache: Arc<TieredCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, cache, clock }
    }

    pub fn cache_key(timeframe: Timeframe, limit: usize, category: Option<&str>) -> String {
        format!(
            "trending_cached:{timeframe}:{limit}:{}",
            category.unwrap_or("all")
        )
    }

    /// Top papers published within `timeframe`, best first.
    pub async fn trending(
        &self,
        timeframe: Timeframe,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<Paper>, RepositoryError> {
        let key = Self::cache_key(timeframe, limit, category);
        if let Some(ids) = self.cache.get::<Vec<String>>(&key).await {
            debug!(key = %key, count = ids.len(), "Trending list from cache");
            return self.repo.papers_by_ids(&ids).await;
        }

        let since = self.clock.today() - chrono::Duration::days(timeframe.days());
        let papers = self.repo.top_ranked(since, category, limit).await?;
        let ids: Vec<&str> = papers.iter().map(|p| p.id.as_str()).collect();
        let write = CacheWrite::new(CacheCategory::TrendingPapers).ttl(timeframe.ttl_secs());
        if let Err(e) = self.cache.set(&key, &ids, write).await {
            tracing::warn!(key = %key, error = %e, "Failed to cache trending list");
        }
        Ok(papers)
    }

    /// Drop every cached view that may include `paper_id`.
    pub async fn invalidate_paper(&self, paper_id: &str) -> usize {
        let mut removed = 0;
        for pattern in [
            format!("paper:{paper_id}"),
            format!("similar:{paper_id}"),
            "trending".to_string(),
            "recommendations:".to_string(),
        ] {
            removed += self.cache.invalidate_pattern(&pattern).await;
        }
        debug!(paper_id, removed, "Invalidated paper caches");
        removed
    }

    /// Drop trending lists scoped to `category` and all category stats.
    pub async fn invalidate_category(&self, category: &str) -> usize {
        let suffix = format!(":{category}");
        let trending = self
            .cache
            .invalidate_matching(move |key: &str| {
                key.starts_with("trending") && key.ends_with(&suffix)
            })
            .await;
        let stats = self.cache.invalidate_pattern("category_stats").await;
        debug!(category, removed = trending + stats, "Invalidated category caches");
        trending + stats
    }
}

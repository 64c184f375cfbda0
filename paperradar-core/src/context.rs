//! Process-wide service wiring.
//!
//! Built once at startup and handed to whatever needs the services; there
//! are no global instances.

use crate::cache::TieredCache;
use crate::clock::{Clock, SystemClock};
use crate::config::RadarConfig;
use crate::error::{ConfigError, Result};
use crate::field_stats::FieldStatsAggregator;
use crate::rate_limiter::RateLimiterRegistry;
use crate::ranking::RankingEngine;
use crate::repository::{PaperRepository, SqliteRepository};
use crate::trending::TrendingService;
use std::sync::Arc;
use tracing::info;

/// Shared handles to every service.
#[derive(Clone)]
pub struct RadarContext {
    config: Arc<RadarConfig>,
    clock: Arc<dyn Clock>,
    repo: Arc<dyn PaperRepository>,
    cache: Arc<TieredCache>,
    rate_limiters: Arc<RateLimiterRegistry>,
    field_stats: Arc<FieldStatsAggregator>,
    ranking: Arc<RankingEngine>,
    trending: Arc<TrendingService>,
}

impl RadarContext {
    /// Wire services over an existing repository and clock.
    pub fn new(
        config: RadarConfig,
        repo: Arc<dyn PaperRepository>,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let data_dir = config.storage.resolved_data_dir();
        let cache = Arc::new(TieredCache::from_config(
            &config.cache,
            &config.ttl,
            &data_dir,
            clock.clone(),
        )?);
        let rate_limiters = Arc::new(RateLimiterRegistry::new(config.rate_limits.clone()));
        let field_stats = Arc::new(FieldStatsAggregator::new(
            repo.clone(),
            cache.clone(),
            clock.clone(),
        ));
        let ranking = Arc::new(RankingEngine::new(
            repo.clone(),
            cache.clone(),
            field_stats.clone(),
            clock.clone(),
            config.ranking.clone(),
        ));
        let trending = Arc::new(TrendingService::new(
            repo.clone(),
            cache.clone(),
            clock.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            clock,
            repo,
            cache,
            rate_limiters,
            field_stats,
            ranking,
            trending,
        })
    }

    /// Wire services over the configured SQLite database and the system
    /// clock.
    pub async fn open(config: RadarConfig) -> Result<Self> {
        let db_path = config.storage.resolved_database_path();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let repo = SqliteRepository::open(&db_path).await?;
        info!(path = %db_path.display(), "Opened paper database");
        Ok(Self::new(config, Arc::new(repo), Arc::new(SystemClock))?)
    }

    pub fn config(&self) -> &RadarConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn repository(&self) -> &Arc<dyn PaperRepository> {
        &self.repo
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn rate_limiters(&self) -> &Arc<RateLimiterRegistry> {
        &self.rate_limiters
    }

    pub fn field_stats(&self) -> &Arc<FieldStatsAggregator> {
        &self.field_stats
    }

    pub fn ranking(&self) -> &Arc<RankingEngine> {
        &self.ranking
    }

    pub fn trending(&self) -> &Arc<TrendingService> {
        &self.trending
    }
}

//! # Paper Radar Core
//!
//! Ranking and caching core for Paper Radar.
//! Provides the volatility-aware tiered cache, per-field citation
//! statistics, the seven-component ranking engine, per-endpoint rate
//! limiting, trending lists, and configuration.

pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod field_stats;
pub mod models;
pub mod persistence;
pub mod ranking;
pub mod rate_limiter;
pub mod repository;
pub mod trending;

// Re-export commonly used types at the crate root.
pub use cache::{
    CacheBackend, CacheCategory, CacheConfig, CacheEntry, CacheStats, CacheWrite, FileTier,
    MemoryTier, PersistentTier, TieredCache, TtlConfig, TtlPolicy,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RadarConfig, StorageConfig, load_config};
pub use context::RadarContext;
pub use error::{CacheError, ConfigError, RadarError, RateLimitError, RepositoryError, Result};
pub use field_stats::{FieldStats, FieldStatsAggregator, percentile_rank};
pub use models::{Author, Implementation, Paper, PaperMetrics, PaperSummary};
pub use ranking::{
    NoveltyBackend, PaperScoreBreakdown, RankingConfig, RankingEngine, RankingWeights, RecalcStats,
};
pub use rate_limiter::{
    AdaptiveRateLimiter, EndpointLimit, ExponentialBackoff, RateLimiterRegistry, RateLimitsConfig,
    RequestPriority, UpstreamError,
};
pub use repository::{InMemoryRepository, PaperRepository, SqliteRepository};
pub use trending::{Timeframe, TrendingService};

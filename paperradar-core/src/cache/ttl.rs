//! Volatility-driven TTL policy.
//!
//! A base TTL per cache category, shortened for fast-moving papers and
//! lengthened for old, settled ones.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Built-in cache categories.
///
/// `ALL` is ordered from most to least volatile; the configured base TTLs must
/// be non-decreasing along that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    TrendingPapers,
    SocialSignals,
    SearchResults,
    Citations,
    UserRecommendations,
    Visualizations,
    Implementations,
    FieldStatistics,
    RankingSignals,
    PaperMetadata,
    Summaries,
    Embeddings,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 12] = [
        CacheCategory::TrendingPapers,
        CacheCategory::SocialSignals,
        CacheCategory::SearchResults,
        CacheCategory::Citations,
        CacheCategory::UserRecommendations,
        CacheCategory::Visualizations,
        CacheCategory::Implementations,
        CacheCategory::FieldStatistics,
        CacheCategory::RankingSignals,
        CacheCategory::PaperMetadata,
        CacheCategory::Summaries,
        CacheCategory::Embeddings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::TrendingPapers => "trending_papers",
            CacheCategory::SocialSignals => "social_signals",
            CacheCategory::SearchResults => "search_results",
            CacheCategory::Citations => "citations",
            CacheCategory::UserRecommendations => "user_recommendations",
            CacheCategory::Visualizations => "visualizations",
            CacheCategory::Implementations => "implementations",
            CacheCategory::FieldStatistics => "field_statistics",
            CacheCategory::RankingSignals => "ranking_signals",
            CacheCategory::PaperMetadata => "paper_metadata",
            CacheCategory::Summaries => "summaries",
            CacheCategory::Embeddings => "embeddings",
        }
    }

    /// Built-in base TTL in seconds.
    pub fn default_ttl_secs(&self) -> u64 {
        match self {
            CacheCategory::TrendingPapers => 600,
            CacheCategory::SocialSignals => 900,
            CacheCategory::SearchResults => 1800,
            CacheCategory::Citations => 3600,
            CacheCategory::UserRecommendations => 3600,
            CacheCategory::Visualizations => 3600,
            CacheCategory::Implementations => 6 * 3600,
            CacheCategory::FieldStatistics => 6 * 3600,
            CacheCategory::RankingSignals => 86_400,
            CacheCategory::PaperMetadata => 7 * 86_400,
            CacheCategory::Summaries => 7 * 86_400,
            CacheCategory::Embeddings => 30 * 86_400,
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CacheCategory {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Serializable TTL settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    /// Base TTL per category name, in seconds.
    #[serde(default = "default_table")]
    pub table: BTreeMap<String, u64>,
    /// TTL for categories missing from the table (default: 3600).
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Citations per week above which TTLs are halved (default: 15).
    #[serde(default = "default_high_velocity")]
    pub high_velocity_threshold: i64,
    /// Paper age in days above which TTLs are doubled (default: 180).
    #[serde(default = "default_stable_age")]
    pub stable_age_days: i64,
}

fn default_table() -> BTreeMap<String, u64> {
    CacheCategory::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), c.default_ttl_secs()))
        .collect()
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_high_velocity() -> i64 {
    15
}
fn default_stable_age() -> i64 {
    180
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            default_ttl_secs: default_ttl_secs(),
            high_velocity_threshold: default_high_velocity(),
            stable_age_days: default_stable_age(),
        }
    }
}

/// Pure mapping from (category, freshness hints) to a TTL.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    table: BTreeMap<String, u64>,
    default_ttl: u64,
    high_velocity_threshold: i64,
    stable_age_days: i64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config_unchecked(&TtlConfig::default())
    }
}

impl TtlPolicy {
    /// Build a policy, rejecting tables that miss a built-in category or
    /// give a more volatile category a longer TTL than a stabler one.
    pub fn from_config(config: &TtlConfig) -> Result<Self, ConfigError> {
        validate(config)?;
        Ok(Self::from_config_unchecked(config))
    }

    fn from_config_unchecked(config: &TtlConfig) -> Self {
        Self {
            table: config.table.clone(),
            default_ttl: config.default_ttl_secs,
            high_velocity_threshold: config.high_velocity_threshold,
            stable_age_days: config.stable_age_days,
        }
    }

    /// Base TTL for a category, falling back to the default on a miss.
    pub fn base_ttl(&self, category: &str) -> u64 {
        self.table
            .get(category)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// TTL in seconds for a category and optional freshness hints.
    ///
    /// Velocity wins over age: a fast-moving paper is halved even when old.
    pub fn get_ttl(
        &self,
        category: &str,
        velocity_hint: Option<i64>,
        age_days_hint: Option<i64>,
    ) -> u64 {
        let base = self.base_ttl(category);
        if let Some(velocity) = velocity_hint
            && velocity > self.high_velocity_threshold
        {
            // A positive base never halves down to "already expired".
            return (base / 2).max(base.min(1));
        }
        if let Some(age) = age_days_hint
            && age > self.stable_age_days
        {
            return base.saturating_mul(2);
        }
        base
    }

    pub fn high_velocity_threshold(&self) -> i64 {
        self.high_velocity_threshold
    }

    pub fn stable_age_days(&self) -> i64 {
        self.stable_age_days
    }
}

fn validate(config: &TtlConfig) -> Result<(), ConfigError> {
    if config.default_ttl_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "ttl.default_ttl_secs must be positive".into(),
        });
    }

    let mut previous: Option<(CacheCategory, u64)> = None;
    for category in CacheCategory::ALL {
        let ttl = *config
            .table
            .get(category.as_str())
            .ok_or_else(|| ConfigError::MissingTtl {
                category: category.as_str().to_string(),
            })?;
        if ttl == 0 {
            return Err(ConfigError::Invalid {
                message: format!("ttl.table.{} must be positive", category),
            });
        }
        if let Some((prev, prev_ttl)) = previous
            && ttl < prev_ttl
        {
            return Err(ConfigError::NonMonotonicTtl {
                category: category.as_str().to_string(),
                ttl_secs: ttl,
                previous: prev.as_str().to_string(),
                previous_ttl_secs: prev_ttl,
            });
        }
        previous = Some((category, ttl));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_ttls() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.get_ttl("trending_papers", None, None), 600);
        assert_eq!(policy.get_ttl("citations", None, None), 3600);
        assert_eq!(policy.get_ttl("paper_metadata", None, None), 604_800);
        assert_eq!(policy.get_ttl("embeddings", None, None), 2_592_000);
    }

    #[test]
    fn test_unknown_category_falls_back() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.get_ttl("something_else", None, None), 3600);
        assert_eq!(policy.get_ttl("something_else", Some(20), None), 1800);
    }

    #[test]
    fn test_high_velocity_halves() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.get_ttl("trending_papers", Some(20), None), 300);
        // At the threshold is not "above" it.
        assert_eq!(policy.get_ttl("trending_papers", Some(15), None), 600);
    }

    #[test]
    fn test_halving_keeps_one_second_ttl_alive() {
        let mut config = TtlConfig::default();
        config.table.insert("trending_papers".into(), 1);
        config.table.insert("scratch".into(), 0);
        let policy = TtlPolicy::from_config(&config).unwrap();
        assert_eq!(policy.get_ttl("trending_papers", Some(100), None), 1);
        assert_eq!(policy.get_ttl("scratch", Some(100), None), 0);
    }

    #[test]
    fn test_stable_age_doubles() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.get_ttl("citations", None, Some(365)), 7200);
        assert_eq!(policy.get_ttl("citations", None, Some(180)), 3600);
        assert_eq!(policy.get_ttl("citations", Some(3), Some(365)), 7200);
    }

    #[test]
    fn test_velocity_takes_precedence_over_age() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.get_ttl("citations", Some(40), Some(400)), 1800);
    }

    #[test]
    fn test_default_table_is_valid() {
        let policy = TtlPolicy::from_config(&TtlConfig::default());
        assert!(policy.is_ok());
    }

    #[test]
    fn test_missing_category_rejected() {
        let mut config = TtlConfig::default();
        config.table.remove("embeddings");
        let err = TtlPolicy::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingTtl { ref category } if category == "embeddings"));
    }

    #[test]
    fn test_non_monotonic_table_rejected() {
        let mut config = TtlConfig::default();
        config.table.insert("citations".into(), 60);
        let err = TtlPolicy::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::NonMonotonicTtl { .. }));
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&CacheCategory::FieldStatistics).unwrap();
        assert_eq!(json, "\"field_statistics\"");
        for category in CacheCategory::ALL {
            let name = serde_json::to_string(&category).unwrap();
            assert_eq!(name.trim_matches('"'), category.as_str());
        }
    }
}

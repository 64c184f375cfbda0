//! The cache record stored in both tiers.

use serde::{Deserialize, Serialize};

/// One cached value with its expiry metadata.
///
/// This is also the on-disk record format of the file tier; `hit_count` is
/// in-memory bookkeeping and is not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub category: String,
    /// Seconds since the unix epoch.
    pub created_at: f64,
    /// Seconds since the unix epoch.
    pub expires_at: f64,
    #[serde(default, skip_serializing)]
    pub hit_count: u64,
    #[serde(default)]
    pub volatility_hint: Option<i64>,
}

impl CacheEntry {
    pub fn new(
        key: impl Into<String>,
        value: serde_json::Value,
        category: impl Into<String>,
        created_at: f64,
        ttl_secs: u64,
        volatility_hint: Option<i64>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            category: category.into(),
            created_at,
            expires_at: created_at + ttl_secs as f64,
            hit_count: 0,
            volatility_hint,
        }
    }

    /// Whether the entry is dead at `now`. An entry expiring exactly now is
    /// already expired.
    pub fn is_expired(&self, now: f64) -> bool {
        self.expires_at <= now
    }

    pub fn remaining_secs(&self, now: f64) -> f64 {
        (self.expires_at - now).max(0.0)
    }
}

//! Error types for the Paper Radar core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering the cache, paper store, rate limiting, and configuration domains.

use std::time::Duration;

/// Top-level error type for the Paper Radar core library.
#[derive(Debug, thiserror::Error)]
pub enum RadarError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the tiered cache store.
///
/// Only `Serialization` ever reaches a caller of `set`; the other variants are
/// absorbed by the store and logged.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Value for key '{key}' cannot be serialized: {message}")]
    Serialization { key: String, message: String },

    #[error("Cache entry for key '{key}' is corrupt: {message}")]
    Corrupt { key: String, message: String },

    #[error("Persistent tier I/O failed: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io {
            message: err.to_string(),
        }
    }
}

/// Errors from the paper store.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Storage task failed: {message}")]
    TaskJoin { message: String },
}

/// Retryable "cannot proceed now" conditions from the rate limiter.
///
/// Plain backpressure (a rejected NORMAL/LOW request) is not an error; it is
/// reported as `Ok(false)` from `acquire`.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Endpoint '{endpoint}' would block for {wait_secs}s, above the wait ceiling")]
    WaitExceeded { endpoint: String, wait_secs: u64 },

    #[error("Endpoint '{endpoint}' still throttled after {attempts} attempts")]
    RetriesExhausted { endpoint: String, attempts: u32 },

    #[error("Endpoint '{endpoint}' rate limited upstream, retry after {retry_after_secs}s")]
    Upstream {
        endpoint: String,
        retry_after_secs: u64,
    },
}

impl RateLimitError {
    /// The endpoint the condition applies to.
    pub fn endpoint(&self) -> &str {
        match self {
            RateLimitError::WaitExceeded { endpoint, .. }
            | RateLimitError::RetriesExhausted { endpoint, .. }
            | RateLimitError::Upstream { endpoint, .. } => endpoint,
        }
    }

    /// Suggested wait before trying again, when one is known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateLimitError::WaitExceeded { wait_secs, .. } => {
                Some(Duration::from_secs(*wait_secs))
            }
            RateLimitError::Upstream {
                retry_after_secs, ..
            } => Some(Duration::from_secs(*retry_after_secs)),
            RateLimitError::RetriesExhausted { .. } => None,
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("No TTL configured for cache category '{category}'")]
    MissingTtl { category: String },

    #[error(
        "TTL for '{category}' ({ttl_secs}s) is shorter than for more volatile '{previous}' ({previous_ttl_secs}s)"
    )]
    NonMonotonicTtl {
        category: String,
        ttl_secs: u64,
        previous: String,
        previous_ttl_secs: u64,
    },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `RadarError`.
pub type Result<T> = std::result::Result<T, RadarError>;

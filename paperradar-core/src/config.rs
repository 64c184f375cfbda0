//! Configuration for Paper Radar.
//!
//! Layered: built-in defaults, then the user config file, then the
//! workspace `.paperradar/config.toml`, then `PAPERRADAR_` environment
//! variables, then explicit overrides.

use crate::cache::{CacheConfig, TtlConfig, TtlPolicy};
use crate::error::ConfigError;
use crate::rate_limiter::RateLimitsConfig;
use crate::ranking::RankingConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-workspace config directory.
pub const WORKSPACE_DIR: &str = ".paperradar";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadarConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ttl: TtlConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
}

/// Where local state lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for the file cache and logs. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// SQLite paper database. Defaults to `<data_dir>/paperradar.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "paperradar", "paperradar")
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| project_dirs().map(|d| d.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(WORKSPACE_DIR))
    }

    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.resolved_data_dir().join("paperradar.db"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.resolved_data_dir().join("logs")
    }
}

impl RadarConfig {
    /// Reject configurations the services cannot run with.
    ///
    /// Section problems are collected and reported together; TTL and
    /// ranking problems are reported as their specific error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        TtlPolicy::from_config(&self.ttl)?;
        self.ranking.validate()?;

        let mut problems = self.cache.validate();
        problems.extend(self.rate_limits.validate());
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: problems.join("; "),
            })
        }
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

/// Load configuration from all layers.
///
/// Environment variables use `__` for nesting, e.g.
/// `PAPERRADAR_CACHE__MAX_MEMORY_ITEMS=500` or
/// `PAPERRADAR_RANKING__NOVELTY_BACKEND=keyword_only`.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&RadarConfig>,
) -> Result<RadarConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(RadarConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_DIR).join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("PAPERRADAR_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs()
        && dirs.config_dir().join("config.toml").exists()
    {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(WORKSPACE_DIR).join("config.toml").exists())
}

//! Paper Radar CLI: batch ranking and cache maintenance.

mod commands;

use clap::Parser;
use paperradar_core::Timeframe;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Paper Radar: field-normalized ranking of research papers
#[derive(Parser, Debug)]
#[command(name = "paperradar", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (reads `.paperradar/config.toml` from here)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Recalculate and store ranking scores
    Rank {
        /// Only rank papers in this category
        #[arg(short, long)]
        category: Option<String>,
        /// Rank papers published within this many days
        #[arg(long, default_value_t = 30)]
        lookback_days: i64,
    },
    /// Print the score breakdown of one paper as JSON
    Score {
        /// Paper id
        paper_id: String,
    },
    /// Print field statistics for a category
    FieldStats {
        /// Category, e.g. cs.LG
        category: String,
        /// Lookback window in days (defaults to ranking.field_stats_days)
        #[arg(long)]
        days: Option<i64>,
    },
    /// List trending papers
    Trending {
        /// day, week or month
        #[arg(short, long, default_value = "week")]
        timeframe: Timeframe,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Inspect or maintain the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CacheAction {
    /// Show hit/miss counters and tier sizes
    Stats,
    /// Remove expired entries from both tiers
    ClearExpired,
    /// Remove every key containing a substring
    Invalidate {
        /// Substring to match
        pattern: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default `.paperradar/config.toml` in the workspace
    Init,
    /// Print the effective configuration as TOML
    Show,
}

fn filter_directive(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = paperradar_core::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter_directive(cli.verbose, cli.quiet)));

    // JSON file layer for structured logging
    let log_dir = config.storage.logs_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "paperradar.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, config, &workspace).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rank() {
        let cli = Cli::try_parse_from(["paperradar", "rank", "--category", "cs.CV"]).unwrap();
        match cli.command {
            Commands::Rank {
                category,
                lookback_days,
            } => {
                assert_eq!(category.as_deref(), Some("cs.CV"));
                assert_eq!(lookback_days, 30);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_trending_timeframe() {
        let cli = Cli::try_parse_from(["paperradar", "trending", "-t", "month", "-l", "5"]).unwrap();
        match cli.command {
            Commands::Trending {
                timeframe, limit, ..
            } => {
                assert_eq!(timeframe, Timeframe::Month);
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["paperradar", "trending", "-t", "decade"]).is_err());
    }

    #[test]
    fn test_parse_cache_invalidate() {
        let cli = Cli::try_parse_from(["paperradar", "-v", "cache", "invalidate", "trending"])
            .unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Invalidate { ref pattern }
            } if pattern == "trending"
        ));
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(0, true), "error");
        assert_eq!(filter_directive(0, false), "info");
        assert_eq!(filter_directive(2, false), "trace");
    }
}

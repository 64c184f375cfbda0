//! Subcommand handlers.

use crate::{CacheAction, Commands, ConfigAction};
use paperradar_core::config::WORKSPACE_DIR;
use paperradar_core::{RadarConfig, RadarContext};
use std::path::Path;
use tracing::info;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: RadarConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => return handle_config(action, config, workspace),
        Commands::Rank {
            category,
            lookback_days,
        } => {
            let ctx = RadarContext::open(config).await?;
            info!(
                category = category.as_deref().unwrap_or("all"),
                lookback_days,
                "Ranking run started"
            );
            let stats = ctx
                .ranking()
                .recalculate_scores(category.as_deref(), lookback_days)
                .await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Score { paper_id } => {
            let ctx = RadarContext::open(config).await?;
            let Some(paper) = ctx.repository().paper(&paper_id).await? else {
                anyhow::bail!("Paper '{}' not found", paper_id);
            };
            let breakdown = ctx.ranking().calculate_paper_score(&paper, None).await;
            println!("{}", serde_json::to_string_pretty(&breakdown)?);
        }
        Commands::FieldStats { category, days } => {
            let ctx = RadarContext::open(config).await?;
            let days = days.unwrap_or(ctx.config().ranking.field_stats_days);
            let stats = ctx.field_stats().get(&category, days).await?;
            println!("Category:        {}", stats.category);
            println!("Sample size:     {}", stats.sample_size);
            println!("Mean citations:  {:.2}", stats.mean_citations);
            println!("Std citations:   {:.2}", stats.std_citations);
            for p in [25, 50, 75, 90, 99] {
                println!(
                    "p{:<2} citations:  {:.1}   velocity: {:.1}",
                    p, stats.citation_percentiles[p], stats.velocity_percentiles[p]
                );
            }
        }
        Commands::Trending {
            timeframe,
            limit,
            category,
        } => {
            let ctx = RadarContext::open(config).await?;
            let papers = ctx
                .trending()
                .trending(timeframe, limit, category.as_deref())
                .await?;
            if papers.is_empty() {
                println!("No papers published in the last {}.", timeframe);
            }
            for (rank, paper) in papers.iter().enumerate() {
                let score = paper
                    .metrics
                    .as_ref()
                    .map_or(0.0, |m| m.overall_rank_score);
                println!(
                    "{:>3}. {:.4}  {}  [{}]  {}",
                    rank + 1,
                    score,
                    paper.arxiv_id,
                    paper.primary_category,
                    paper.title
                );
            }
        }
        Commands::Cache { action } => {
            let ctx = RadarContext::open(config).await?;
            handle_cache(action, &ctx).await?;
        }
    }
    Ok(())
}

async fn handle_cache(action: CacheAction, ctx: &RadarContext) -> anyhow::Result<()> {
    match action {
        CacheAction::Stats => {
            let stats = ctx.cache().get_stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        CacheAction::ClearExpired => {
            let removed = ctx.cache().clear_expired().await;
            info!(removed, "Cleared expired cache entries");
            println!("Removed {} expired entries", removed);
        }
        CacheAction::Invalidate { pattern } => {
            let removed = ctx.cache().invalidate_pattern(&pattern).await;
            println!("Removed {} entries matching '{}'", removed, pattern);
        }
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    config: RadarConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(WORKSPACE_DIR);
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = RadarConfig::default().to_toml()?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            config.validate()?;
            println!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

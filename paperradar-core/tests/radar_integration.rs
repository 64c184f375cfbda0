//! End-to-end tests over the on-disk cache and the SQLite paper store.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use paperradar_core::cache::{CacheBackend, FileTier, TtlPolicy};
use paperradar_core::models::{Author, Implementation, Paper, PaperMetrics, PaperSummary};
use paperradar_core::{
    CacheCategory, CacheWrite, ManualClock, PaperRepository, RadarConfig, RadarContext,
    SqliteRepository, TieredCache, Timeframe,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 4, 15, 9, 0, 0).unwrap(),
    ))
}

fn file_cache(dir: &std::path::Path, clock: Arc<ManualClock>) -> TieredCache {
    TieredCache::new(
        Arc::new(FileTier::new(dir)),
        TtlPolicy::default(),
        16,
        clock,
    )
}

#[tokio::test]
async fn file_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();

    {
        let cache = file_cache(dir.path(), clock.clone());
        cache
            .set(
                "paper:2504.00001",
                &vec!["graph", "transformer"],
                CacheWrite::new(CacheCategory::PaperMetadata),
            )
            .await
            .unwrap();
    }

    let cache = file_cache(dir.path(), clock.clone());
    let value: Option<Vec<String>> = cache.get("paper:2504.00001").await;
    assert_eq!(value, Some(vec!["graph".to_string(), "transformer".to_string()]));

    let stats = cache.get_stats().await;
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(stats.memory_items, 1);
    assert_eq!(stats.disk_items, 1);

    // Trending lists expire long before paper metadata.
    cache
        .set(
            "trending_cached:day:5:all",
            &vec!["2504.00001"],
            CacheWrite::new(CacheCategory::TrendingPapers),
        )
        .await
        .unwrap();
    clock.advance(Duration::minutes(11));
    assert_eq!(cache.clear_expired().await, 1);
    assert!(cache.get_value("paper:2504.00001").await.is_some());
}

#[tokio::test]
async fn corrupt_record_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    {
        let cache = file_cache(dir.path(), clock.clone());
        cache
            .set("search:llm", &42, CacheWrite::new(CacheCategory::SearchResults))
            .await
            .unwrap();
    }
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        std::fs::write(entry.unwrap().path(), b"{ not json").unwrap();
    }

    let cache = file_cache(dir.path(), clock);
    assert!(cache.get_value("search:llm").await.is_none());
    assert_eq!(cache.get_stats().await.misses, 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

fn fixture(id: &str, days_old: i64, citations: i64, velocity: i64, stars: i64) -> Paper {
    let published = NaiveDate::from_ymd_opt(2025, 4, 15).unwrap() - Duration::days(days_old);
    let mut paper = Paper::new(id, format!("Paper {id}"), "cs.CL", published);
    paper.abstract_text = "We propose a retrieval augmented decoder with sparse routing".into();
    paper.authors = vec![Author::new("A. Researcher"), Author::new("B. Scientist")];
    paper.metrics = Some(PaperMetrics {
        citation_count: citations,
        citation_velocity_7d: velocity,
        github_stars: stars,
        social_score: 10.0,
        ..Default::default()
    });
    if stars > 0 {
        paper.implementations = vec![Implementation {
            source: "github".into(),
            repo_url: format!("https://github.com/lab/{id}"),
            repo_name: format!("lab/{id}"),
            stars,
            description: None,
            language: Some("Python".into()),
            last_updated: Some(Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()),
        }];
        paper.summary = Some(PaperSummary {
            one_line_summary: "Sparse routing for retrieval".into(),
            methodology: Some("Mixture of experts".into()),
            results_summary: Some("Beats baselines".into()),
            ..Default::default()
        });
    }
    paper
}

#[tokio::test]
async fn sqlite_ranking_and_trending() {
    let dir = tempfile::tempdir().unwrap();
    let repo = SqliteRepository::open(dir.path().join("radar.db"))
        .await
        .unwrap();
    for paper in [
        fixture("strong", 3, 120, 40, 4_000),
        fixture("middling", 10, 12, 3, 0),
        fixture("quiet", 20, 0, 0, 0),
        fixture("ancient", 400, 900, 1, 0),
    ] {
        repo.upsert_paper(&paper).await.unwrap();
    }
    let repo = Arc::new(repo);

    let mut config = RadarConfig::default();
    config.cache.backend = CacheBackend::Memory;
    let ctx = RadarContext::new(config, repo.clone(), clock()).unwrap();

    let stats = ctx.ranking().recalculate_scores(None, 30).await.unwrap();
    assert_eq!((stats.processed, stats.updated, stats.errors), (3, 3, 0));

    let ancient = repo.paper("ancient").await.unwrap().unwrap();
    assert_eq!(ancient.metrics.unwrap().overall_rank_score, 0.0);

    let trending = ctx
        .trending()
        .trending(Timeframe::Month, 10, Some("cs.CL"))
        .await
        .unwrap();
    let ids: Vec<&str> = trending.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids[0], "strong");
    assert_eq!(ids.len(), 3);

    let scores: Vec<f64> = trending
        .iter()
        .map(|p| p.metrics.as_ref().map_or(0.0, |m| m.overall_rank_score))
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));

    let strong = repo.paper("strong").await.unwrap().unwrap();
    let breakdown = ctx.ranking().calculate_paper_score(&strong, None).await;
    assert_eq!(breakdown.reproducibility, 1.0);
    assert!(breakdown.freshness_boost > 1.0);
    assert!((breakdown.total_score - scores[0]).abs() < 1e-9);
}

use chrono::{NaiveDate, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use paperradar_core::cache::{CacheCategory, MemoryTier, TtlPolicy};
use paperradar_core::field_stats::{FieldStats, percentile_rank, percentiles};
use paperradar_core::models::{Author, Implementation, Paper, PaperMetrics};
use paperradar_core::ranking::components::keyword_novelty;
use paperradar_core::{
    CacheWrite, FieldStatsAggregator, InMemoryRepository, ManualClock, RankingConfig,
    RankingEngine, TieredCache,
};
use std::sync::Arc;

fn sample_values(n: usize) -> Vec<f64> {
    // Deterministic, skewed like citation counts.
    (0..n).map(|i| ((i * 7919) % 1000) as f64 * (i % 13) as f64).collect()
}

fn bench_percentiles(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_stats_percentiles");
    for n in [100usize, 1_000, 10_000] {
        let values = sample_values(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| percentiles(black_box(values)))
        });
    }
    group.finish();

    let table = percentiles(&sample_values(5_000));
    c.bench_function("percentile_rank_lookup", |b| {
        b.iter(|| percentile_rank(black_box(4_321.0), black_box(&table)))
    });

    let metrics: Vec<PaperMetrics> = sample_values(5_000)
        .into_iter()
        .map(|v| PaperMetrics {
            citation_count: v as i64,
            citation_velocity_7d: (v / 10.0) as i64,
            ..Default::default()
        })
        .collect();
    c.bench_function("field_stats_from_5000_metrics", |b| {
        b.iter(|| FieldStats::from_metrics("cs.LG", black_box(&metrics)))
    });
}

fn bench_ttl(c: &mut Criterion) {
    let policy = TtlPolicy::default();
    c.bench_function("ttl_with_velocity_hint", |b| {
        b.iter(|| policy.get_ttl(black_box("citations"), black_box(Some(20)), black_box(Some(400))))
    });
}

fn bench_scoring(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
    ));

    let mut papers: Vec<Paper> = (0..500)
        .map(|i| {
            let mut p = Paper::new(
                format!("p{i}"),
                "peer",
                "cs.LG",
                NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            );
            p.metrics = Some(PaperMetrics {
                citation_count: (i * 3) % 200,
                citation_velocity_7d: i % 40,
                ..Default::default()
            });
            p
        })
        .collect();

    let mut target = Paper::new(
        "target",
        "Sparse retrieval",
        "cs.LG",
        NaiveDate::from_ymd_opt(2025, 5, 25).unwrap(),
    );
    target.abstract_text =
        "We introduce a sparse retrieval decoder with learned routing over memory shards".into();
    target.authors = (0..6).map(|i| Author::new(format!("Author {i}"))).collect();
    target.implementations = vec![Implementation {
        source: "github".into(),
        repo_url: "https://github.com/lab/sparse".into(),
        repo_name: "lab/sparse".into(),
        stars: 1_200,
        description: None,
        language: Some("Python".into()),
        last_updated: None,
    }];
    target.metrics = Some(PaperMetrics {
        citation_count: 40,
        citation_velocity_7d: 12,
        github_stars: 1_200,
        social_score: 35.0,
        ..Default::default()
    });
    papers.push(target.clone());

    let repo = Arc::new(InMemoryRepository::with_papers(papers));
    let cache = Arc::new(TieredCache::new(
        Arc::new(MemoryTier::new()),
        TtlPolicy::default(),
        10_000,
        clock.clone(),
    ));
    let stats = Arc::new(FieldStatsAggregator::new(
        repo.clone(),
        cache.clone(),
        clock.clone(),
    ));
    let engine = RankingEngine::new(repo, cache.clone(), stats, clock, RankingConfig::default());

    // Warm sub-score caches so the loop measures steady-state scoring.
    rt.block_on(engine.calculate_paper_score(&target, None));

    c.bench_function("calculate_paper_score_warm", |b| {
        b.iter(|| rt.block_on(engine.calculate_paper_score(black_box(&target), None)))
    });

    c.bench_function("cache_set_get", |b| {
        b.iter(|| {
            rt.block_on(async {
                cache
                    .set("bench:key", &[1u32, 2, 3], CacheWrite::new(CacheCategory::Citations))
                    .await
                    .unwrap();
                cache.get_value(black_box("bench:key")).await
            })
        })
    });

    c.bench_function("keyword_novelty", |b| {
        b.iter(|| keyword_novelty(black_box(&target.abstract_text)))
    });
}

criterion_group!(benches, bench_percentiles, bench_ttl, bench_scoring);
criterion_main!(benches);

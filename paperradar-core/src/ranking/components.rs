//! Pure scoring functions. Every component returns a value in [0, 1].

use crate::field_stats::FieldStats;
use crate::models::{Author, Implementation, Paper, PaperMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Terms too common in ML abstracts to signal novelty.
const COMMON_ML_TERMS: [&str; 10] = [
    "neural",
    "network",
    "learning",
    "model",
    "training",
    "data",
    "loss",
    "optimization",
    "gradient",
    "feature",
];

/// Outcome of growth detection over a weekly citation history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    /// Recent citations outpace earlier ones by more than 1.5x.
    Exponential,
    /// Growth score in [0, 1]; 1.0 at 200% growth.
    Score(f64),
}

/// Compare the last four weekly counts against everything before them.
///
/// Needs at least four points. With exactly four, the earlier average is
/// assumed to be half the recent one.
pub fn detect_growth(history: &[f64]) -> Option<Growth> {
    if history.len() < 4 {
        return None;
    }
    let (older, recent) = history.split_at(history.len() - 4);
    let recent_avg = mean(recent);
    let older_avg = if older.is_empty() {
        recent_avg / 2.0
    } else {
        mean(older)
    };

    if older_avg > 0.0 && recent_avg > older_avg * 1.5 {
        return Some(Growth::Exponential);
    }
    let score = if older_avg > 0.0 {
        (recent_avg - older_avg) / older_avg / 2.0
    } else {
        recent_avg / 10.0
    };
    Some(Growth::Score(score.clamp(0.0, 1.0)))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Blend of growth detection and the field-normalized velocity rank.
///
/// Falls back to `velocity / baseline` when the field has no stats.
pub fn citation_momentum(
    metrics: Option<&PaperMetrics>,
    history: &[f64],
    stats: &FieldStats,
    baseline: f64,
) -> f64 {
    let Some(metrics) = metrics else {
        return 0.0;
    };
    let growth = match detect_growth(history) {
        Some(Growth::Exponential) => return 1.0,
        Some(Growth::Score(score)) => score,
        None => 0.0,
    };

    let velocity = metrics.citation_velocity_7d.max(0) as f64;
    let velocity_rank = if stats.is_empty() {
        if baseline > 0.0 {
            (velocity / baseline).min(1.0)
        } else {
            0.0
        }
    } else {
        stats.velocity_rank(velocity)
    };

    0.4 * growth + 0.6 * velocity_rank
}

/// Log-scaled star score, saturating at 10k stars.
pub fn star_score(stars: i64) -> f64 {
    if stars <= 0 {
        return 0.0;
    }
    ((stars as f64 + 1.0).log10() / 4.0).min(1.0)
}

/// Linear decay over 180 days since the last update; 0.3 when unknown.
pub fn activity_score(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_updated {
        Some(updated) => {
            let days = (now - updated).num_days() as f64;
            (1.0 - days / 180.0).clamp(0.0, 1.0)
        }
        None => 0.3,
    }
}

pub fn language_score(language: Option<&str>) -> f64 {
    match language {
        Some("Python") | Some("PyTorch") => 0.2,
        Some("Jupyter Notebook") => 0.15,
        _ => 0.1,
    }
}

/// Repository quality indicators. Neutral until someone inspects the repo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepoQuality {
    pub has_tests: f64,
    pub has_docs: f64,
    pub issue_resolution: f64,
}

impl Default for RepoQuality {
    fn default() -> Self {
        Self {
            has_tests: 0.5,
            has_docs: 0.5,
            issue_resolution: 0.5,
        }
    }
}

pub fn implementation_score(
    implementation: &Implementation,
    quality: &RepoQuality,
    now: DateTime<Utc>,
) -> f64 {
    0.30 * star_score(implementation.stars)
        + 0.20 * activity_score(implementation.last_updated, now)
        + 0.10 * language_score(implementation.language.as_deref())
        + 0.15 * quality.has_tests.clamp(0.0, 1.0)
        + 0.15 * quality.has_docs.clamp(0.0, 1.0)
        + 0.10 * quality.issue_resolution.clamp(0.0, 1.0)
}

/// Collaboration heuristic from the author list; 0.3 when there is none.
pub fn author_credibility(authors: &[Author]) -> f64 {
    if authors.is_empty() {
        return 0.3;
    }
    let collaboration = (authors.len() as f64 / 5.0).min(1.0) * 0.3;
    let affiliation = 0.5;
    collaboration + affiliation * 0.7
}

/// Share of distinct abstract terms outside the common-term list, doubled.
pub fn keyword_novelty(abstract_text: &str) -> f64 {
    let lowered = abstract_text.to_lowercase();
    let words: HashSet<&str> = lowered.split_whitespace().collect();
    let uncommon = words
        .iter()
        .filter(|w| !COMMON_ML_TERMS.contains(*w))
        .count();
    let ratio = uncommon as f64 / words.len().max(1) as f64;
    (ratio * 2.0).min(1.0)
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// One minus the mean similarity to recent papers; 0.5 with nothing to
/// compare against.
pub fn embedding_novelty(embedding: &[f64], recent: &[Vec<f64>]) -> f64 {
    if recent.is_empty() {
        return 0.5;
    }
    let total: f64 = recent
        .iter()
        .map(|other| cosine_similarity(embedding, other))
        .sum();
    (1.0 - total / recent.len() as f64).clamp(0.0, 1.0)
}

pub fn reproducibility(paper: &Paper) -> f64 {
    let mut score = 0.0;
    if !paper.implementations.is_empty() {
        score += 0.5;
    }
    if let Some(summary) = &paper.summary {
        if summary.has_methodology() {
            score += 0.25;
        }
        if summary.has_results() {
            score += 0.25;
        }
    }
    score
}

pub fn community_engagement(metrics: Option<&PaperMetrics>) -> f64 {
    let Some(metrics) = metrics else {
        return 0.0;
    };
    let social = (metrics.social_score / 100.0).clamp(0.0, 1.0) * 0.5;
    let github = star_score(metrics.github_stars) * 0.5;
    social + github
}

/// `exp(-decay_rate * days)`, zero from `cutoff_days` on.
pub fn recency(days_old: i64, decay_rate: f64, cutoff_days: i64) -> f64 {
    if days_old >= cutoff_days {
        return 0.0;
    }
    (-decay_rate * days_old.max(0) as f64).exp()
}

/// Parameters of the adaptive freshness multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessParams {
    /// Boost at day 0 (default: 1.5).
    pub max_boost: f64,
    /// Papers older than this get no boost (default: 30).
    pub window_days: i64,
    /// Boost ceiling for papers with neither citations nor stars (default: 1.1).
    pub no_traction_cap: f64,
}

impl Default for FreshnessParams {
    fn default() -> Self {
        Self {
            max_boost: 1.5,
            window_days: 30,
            no_traction_cap: 1.1,
        }
    }
}

/// Multiplier for recent papers, damped by how much traction they have.
pub fn freshness_boost(
    days_old: i64,
    metrics: Option<&PaperMetrics>,
    params: &FreshnessParams,
) -> f64 {
    if days_old > params.window_days || params.window_days <= 0 {
        return 1.0;
    }
    let Some(metrics) = metrics else {
        return 1.0;
    };
    let elapsed = days_old.max(0) as f64 / params.window_days as f64;
    let base = 1.0 + (1.0 - elapsed) * (params.max_boost - 1.0);

    if metrics.citation_count == 0 && metrics.github_stars == 0 {
        return base.min(params.no_traction_cap);
    }
    let traction = (metrics.citation_count.max(0) as f64 / 5.0
        + metrics.github_stars.max(0) as f64 / 50.0)
        .min(1.0);
    1.0 + (base - 1.0) * traction
}

/// Combined standing against the field: 40% citations, 60% velocity.
pub fn field_percentile(metrics: Option<&PaperMetrics>, stats: &FieldStats) -> f64 {
    if stats.is_empty() {
        return 0.5;
    }
    let (citations, velocity) = metrics.map_or((0.0, 0.0), |m| {
        (m.citation_count as f64, m.citation_velocity_7d as f64)
    });
    0.4 * stats.citation_rank(citations) + 0.6 * stats.velocity_rank(velocity)
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperSummary;
    use chrono::{NaiveDate, TimeZone};

    fn metrics(citations: i64, velocity: i64, stars: i64) -> PaperMetrics {
        PaperMetrics {
            citation_count: citations,
            citation_velocity_7d: velocity,
            github_stars: stars,
            ..Default::default()
        }
    }

    #[test]
    fn test_exponential_growth_detected() {
        let history = [1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 10.0, 12.0, 14.0, 16.0];
        assert_eq!(detect_growth(&history), Some(Growth::Exponential));

        let stats = FieldStats::from_metrics("cs.LG", &[metrics(0, 100, 0)]);
        let momentum = citation_momentum(Some(&metrics(0, 0, 0)), &history, &stats, 20.0);
        assert_eq!(momentum, 1.0);
    }

    #[test]
    fn test_growth_needs_four_points() {
        assert_eq!(detect_growth(&[5.0, 6.0, 7.0]), None);
    }

    #[test]
    fn test_growth_with_exactly_four_points() {
        // Older average is half the recent one, i.e. 100% growth.
        assert_eq!(detect_growth(&[4.0, 4.0, 4.0, 4.0]), Some(Growth::Exponential));
        // Zero history falls to the zero-baseline branch.
        assert_eq!(detect_growth(&[0.0; 4]), Some(Growth::Score(0.0)));
    }

    #[test]
    fn test_growth_score_from_relative_change() {
        // Older 10, recent 12: 20% growth scores 0.1.
        let history = [10.0, 10.0, 12.0, 12.0, 12.0, 12.0];
        match detect_growth(&history) {
            Some(Growth::Score(score)) => assert!((score - 0.1).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        // Decline clamps at zero.
        assert_eq!(
            detect_growth(&[10.0, 10.0, 1.0, 1.0, 1.0, 1.0]),
            Some(Growth::Score(0.0))
        );
    }

    #[test]
    fn test_growth_zero_older_average() {
        assert_eq!(
            detect_growth(&[0.0, 0.0, 5.0, 5.0, 5.0, 5.0]),
            Some(Growth::Score(0.5))
        );
    }

    #[test]
    fn test_momentum_baseline_fallback() {
        let empty = FieldStats::empty("cs.LG");
        let m = metrics(0, 10, 0);
        assert_eq!(citation_momentum(Some(&m), &[], &empty, 20.0), 0.6 * 0.5);
        let fast = metrics(0, 50, 0);
        assert_eq!(citation_momentum(Some(&fast), &[], &empty, 20.0), 0.6);
        assert_eq!(citation_momentum(None, &[], &empty, 20.0), 0.0);
    }

    #[test]
    fn test_momentum_uses_field_rank() {
        let field: Vec<PaperMetrics> = (0..100).map(|v| metrics(0, v, 0)).collect();
        let stats = FieldStats::from_metrics("cs.LG", &field);
        let momentum = citation_momentum(Some(&metrics(0, 50, 0)), &[], &stats, 20.0);
        // Velocity 50 first fits under the 51st percentile point (50.49).
        assert!((momentum - 0.6 * 0.51).abs() < 1e-9);
    }

    #[test]
    fn test_star_score() {
        assert_eq!(star_score(0), 0.0);
        assert_eq!(star_score(-3), 0.0);
        assert!((star_score(999) - 0.75).abs() < 1e-12);
        assert_eq!(star_score(1_000_000), 1.0);
    }

    #[test]
    fn test_activity_score() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(activity_score(None, now), 0.3);
        assert_eq!(activity_score(Some(now), now), 1.0);
        let ninety = now - chrono::Duration::days(90);
        assert_eq!(activity_score(Some(ninety), now), 0.5);
        let ancient = now - chrono::Duration::days(400);
        assert_eq!(activity_score(Some(ancient), now), 0.0);
    }

    #[test]
    fn test_implementation_score_with_neutral_quality() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let imp = Implementation {
            source: "github".into(),
            repo_url: "https://github.com/a/b".into(),
            repo_name: "a/b".into(),
            stars: 0,
            description: None,
            language: Some("Rust".into()),
            last_updated: None,
        };
        let score = implementation_score(&imp, &RepoQuality::default(), now);
        // 0.2*0.3 + 0.1*0.1 + 0.4*0.5
        assert!((score - 0.27).abs() < 1e-12);
    }

    #[test]
    fn test_author_credibility() {
        assert_eq!(author_credibility(&[]), 0.3);
        let one = vec![Author::new("A")];
        assert!((author_credibility(&one) - (0.06 + 0.35)).abs() < 1e-12);
        let many: Vec<Author> = (0..8).map(|i| Author::new(format!("A{i}"))).collect();
        assert!((author_credibility(&many) - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_keyword_novelty() {
        assert_eq!(keyword_novelty(""), 0.0);
        // 2 of 4 distinct words are common: ratio 0.5, doubled.
        assert_eq!(keyword_novelty("Neural network topology sheaves"), 1.0);
        // 3 of 4 common.
        assert_eq!(keyword_novelty("neural network training sheaves"), 0.5);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_embedding_novelty() {
        assert_eq!(embedding_novelty(&[1.0, 0.0], &[]), 0.5);
        let recent = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert!((embedding_novelty(&[1.0, 0.0], &recent) - 0.5).abs() < 1e-12);
        let opposite = vec![vec![-1.0, 0.0]];
        assert_eq!(embedding_novelty(&[1.0, 0.0], &opposite), 1.0);
    }

    #[test]
    fn test_reproducibility_additive() {
        let mut paper = Paper::new("p", "t", "cs.LG", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(reproducibility(&paper), 0.0);

        paper.implementations.push(Implementation {
            source: "github".into(),
            repo_url: "u".into(),
            repo_name: "n".into(),
            stars: 1,
            description: None,
            language: None,
            last_updated: None,
        });
        paper.summary = Some(PaperSummary {
            one_line_summary: "s".into(),
            methodology: Some("Ablations over depth".into()),
            ..Default::default()
        });
        assert_eq!(reproducibility(&paper), 0.75);
    }

    #[test]
    fn test_community_engagement() {
        assert_eq!(community_engagement(None), 0.0);
        let m = PaperMetrics {
            social_score: 250.0,
            github_stars: 1_000_000,
            ..Default::default()
        };
        assert_eq!(community_engagement(Some(&m)), 1.0);
        let half = PaperMetrics {
            social_score: 50.0,
            ..Default::default()
        };
        assert_eq!(community_engagement(Some(&half)), 0.25);
    }

    #[test]
    fn test_recency_decay_and_cutoff() {
        assert_eq!(recency(0, 0.03, 90), 1.0);
        assert!((recency(23, 0.03, 90) - (-0.69f64).exp()).abs() < 1e-12);
        assert_eq!(recency(90, 0.03, 90), 0.0);
        assert_eq!(recency(-2, 0.03, 90), 1.0);
    }

    #[test]
    fn test_freshness_boost() {
        let params = FreshnessParams::default();
        let none = metrics(0, 0, 0);
        let strong = metrics(10, 0, 100);

        assert_eq!(freshness_boost(31, Some(&strong), &params), 1.0);
        assert_eq!(freshness_boost(0, None, &params), 1.0);
        assert_eq!(freshness_boost(0, Some(&none), &params), 1.1);
        assert_eq!(freshness_boost(0, Some(&strong), &params), 1.5);
        assert_eq!(freshness_boost(15, Some(&strong), &params), 1.25);
        assert_eq!(freshness_boost(30, Some(&strong), &params), 1.0);

        // One citation: traction 0.2.
        let weak = metrics(1, 0, 0);
        assert!((freshness_boost(0, Some(&weak), &params) - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_traction_never_lowers_boost() {
        let params = FreshnessParams::default();
        let none = metrics(0, 0, 0);
        let strong = metrics(50, 0, 500);
        assert!(
            freshness_boost(0, Some(&strong), &params) >= freshness_boost(0, Some(&none), &params)
        );
    }

    #[test]
    fn test_field_percentile() {
        assert_eq!(field_percentile(None, &FieldStats::empty("x")), 0.5);
        let field: Vec<PaperMetrics> = (0..100).map(|v| metrics(v, v, 0)).collect();
        let stats = FieldStats::from_metrics("x", &field);
        let p = field_percentile(Some(&metrics(1000, 1000, 0)), &stats);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(1.0), 1.0);
    }
}

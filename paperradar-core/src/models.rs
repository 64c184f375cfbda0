//! Paper records consumed by the ranking engine.
//!
//! The core reads these but does not own their lifecycle; enrichment jobs
//! populate them and the repository hands them over.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A paper author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliations: Vec<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliations: Vec::new(),
        }
    }
}

/// Citation, code and social metrics for one paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperMetrics {
    #[serde(default)]
    pub citation_count: i64,
    /// New citations over the last week.
    #[serde(default)]
    pub citation_velocity_7d: i64,
    #[serde(default)]
    pub github_stars: i64,
    #[serde(default)]
    pub github_repos_count: i64,
    #[serde(default)]
    pub social_score: f64,
    /// Last score written by the ranking job.
    #[serde(default)]
    pub overall_rank_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_metrics_update: Option<DateTime<Utc>>,
}

/// A code repository or model linked to a paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    /// "github", "huggingface" or "paperswithcode".
    pub source: String,
    pub repo_url: String,
    pub repo_name: String,
    #[serde(default)]
    pub stars: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Generated summary of a paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperSummary {
    pub one_line_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methodology: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_innovation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limitations: Option<String>,
}

impl PaperSummary {
    pub fn has_methodology(&self) -> bool {
        non_blank(self.methodology.as_deref())
    }

    pub fn has_results(&self) -> bool {
        non_blank(self.results_summary.as_deref())
    }
}

fn non_blank(text: Option<&str>) -> bool {
    text.is_some_and(|t| !t.trim().is_empty())
}

/// A paper with everything the scorer looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub arxiv_id: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub published_date: NaiveDate,
    pub primary_category: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub implementations: Vec<Implementation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<PaperSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PaperMetrics>,
}

impl Paper {
    /// Minimal paper, mostly useful for tests and fixtures.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        primary_category: impl Into<String>,
        published_date: NaiveDate,
    ) -> Self {
        let id = id.into();
        let primary_category = primary_category.into();
        Self {
            arxiv_id: id.clone(),
            id,
            title: title.into(),
            abstract_text: String::new(),
            authors: Vec::new(),
            published_date,
            categories: vec![primary_category.clone()],
            primary_category,
            implementations: Vec::new(),
            summary: None,
            metrics: None,
        }
    }

    /// Whole days since publication; negative for future-dated papers.
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.published_date).num_days()
    }
}

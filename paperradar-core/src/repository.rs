//! Paper store consumed by the field statistics aggregator, the ranking job
//! and the trending service.
//!
//! `SqliteRepository` reads the local-mode database (`papers`,
//! `paper_metrics`, `paper_implementations`, `paper_summaries`). All SQLite
//! work runs on the blocking pool.

use crate::error::RepositoryError;
use crate::models::{Author, Implementation, Paper, PaperMetrics, PaperSummary};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Read access to papers and their metrics, plus the single write the
/// ranking job performs.
#[async_trait]
pub trait PaperRepository: Send + Sync {
    /// Papers published on or after `since`, optionally in one category,
    /// with metrics, implementations and summary attached.
    async fn papers_since(
        &self,
        since: NaiveDate,
        category: Option<&str>,
    ) -> Result<Vec<Paper>, RepositoryError>;

    /// Metrics of every paper in `category` published on or after `since`.
    /// Papers without a metrics row are not included.
    async fn category_metrics(
        &self,
        category: &str,
        since: NaiveDate,
    ) -> Result<Vec<PaperMetrics>, RepositoryError>;

    /// Ids of the most recently published papers in a category.
    async fn recent_paper_ids(
        &self,
        category: &str,
        exclude_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError>;

    async fn paper(&self, id: &str) -> Result<Option<Paper>, RepositoryError>;

    /// Fetch papers by id, in the order given. Unknown ids are skipped.
    async fn papers_by_ids(&self, ids: &[String]) -> Result<Vec<Paper>, RepositoryError>;

    /// Highest `overall_rank_score` first, newest first on ties. Papers
    /// without metrics rank as zero.
    async fn top_ranked(
        &self,
        since: NaiveDate,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Paper>, RepositoryError>;

    /// Store a paper's overall score, creating its metrics row if needed.
    async fn update_rank_score(&self, paper_id: &str, score: f64) -> Result<(), RepositoryError>;
}

fn rank_order(a: &Paper, b: &Paper) -> std::cmp::Ordering {
    let score = |p: &Paper| p.metrics.as_ref().map_or(0.0, |m| m.overall_rank_score);
    score(b)
        .total_cmp(&score(a))
        .then_with(|| b.published_date.cmp(&a.published_date))
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Map-backed repository for tests and small fixtures.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    papers: RwLock<HashMap<String, Paper>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_papers(papers: impl IntoIterator<Item = Paper>) -> Self {
        Self {
            papers: RwLock::new(papers.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub async fn insert(&self, paper: Paper) {
        self.papers.write().await.insert(paper.id.clone(), paper);
    }
}

#[async_trait]
impl PaperRepository for InMemoryRepository {
    async fn papers_since(
        &self,
        since: NaiveDate,
        category: Option<&str>,
    ) -> Result<Vec<Paper>, RepositoryError> {
        let papers = self.papers.read().await;
        let mut selected: Vec<Paper> = papers
            .values()
            .filter(|p| p.published_date >= since)
            .filter(|p| category.is_none_or(|c| p.primary_category == c))
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(selected)
    }

    async fn category_metrics(
        &self,
        category: &str,
        since: NaiveDate,
    ) -> Result<Vec<PaperMetrics>, RepositoryError> {
        let papers = self.papers.read().await;
        Ok(papers
            .values()
            .filter(|p| p.primary_category == category && p.published_date >= since)
            .filter_map(|p| p.metrics.clone())
            .collect())
    }

    async fn recent_paper_ids(
        &self,
        category: &str,
        exclude_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError> {
        let papers = self.papers.read().await;
        let mut recent: Vec<&Paper> = papers
            .values()
            .filter(|p| p.primary_category == category && p.id != exclude_id)
            .collect();
        recent.sort_by(|a, b| {
            b.published_date
                .cmp(&a.published_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(recent.into_iter().take(limit).map(|p| p.id.clone()).collect())
    }

    async fn paper(&self, id: &str) -> Result<Option<Paper>, RepositoryError> {
        Ok(self.papers.read().await.get(id).cloned())
    }

    async fn papers_by_ids(&self, ids: &[String]) -> Result<Vec<Paper>, RepositoryError> {
        let papers = self.papers.read().await;
        Ok(ids.iter().filter_map(|id| papers.get(id).cloned()).collect())
    }

    async fn top_ranked(
        &self,
        since: NaiveDate,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Paper>, RepositoryError> {
        let mut papers = self.papers_since(since, category).await?;
        papers.sort_by(rank_order);
        papers.truncate(limit);
        Ok(papers)
    }

    async fn update_rank_score(&self, paper_id: &str, score: f64) -> Result<(), RepositoryError> {
        let mut papers = self.papers.write().await;
        let paper = papers
            .get_mut(paper_id)
            .ok_or_else(|| RepositoryError::Query {
                message: format!("paper '{paper_id}' not found"),
            })?;
        paper
            .metrics
            .get_or_insert_with(PaperMetrics::default)
            .overall_rank_score = score;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS papers (
    id TEXT PRIMARY KEY,
    arxiv_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    abstract TEXT NOT NULL DEFAULT '',
    authors TEXT NOT NULL DEFAULT '[]',
    published_date TEXT NOT NULL,
    primary_category TEXT NOT NULL,
    categories TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS ix_papers_category_date
    ON papers (primary_category, published_date);
CREATE TABLE IF NOT EXISTS paper_metrics (
    paper_id TEXT PRIMARY KEY REFERENCES papers(id),
    citation_count INTEGER NOT NULL DEFAULT 0,
    citation_velocity_7d INTEGER NOT NULL DEFAULT 0,
    github_stars INTEGER NOT NULL DEFAULT 0,
    github_repos_count INTEGER NOT NULL DEFAULT 0,
    social_score REAL NOT NULL DEFAULT 0.0,
    overall_rank_score REAL NOT NULL DEFAULT 0.0,
    last_metrics_update TEXT
);
CREATE TABLE IF NOT EXISTS paper_implementations (
    paper_id TEXT NOT NULL REFERENCES papers(id),
    source TEXT NOT NULL,
    repo_url TEXT NOT NULL,
    repo_name TEXT NOT NULL,
    stars INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    language TEXT,
    last_updated TEXT
);
CREATE INDEX IF NOT EXISTS ix_impl_paper ON paper_implementations (paper_id);
CREATE TABLE IF NOT EXISTS paper_summaries (
    paper_id TEXT PRIMARY KEY REFERENCES papers(id),
    one_line_summary TEXT NOT NULL,
    methodology TEXT,
    results_summary TEXT,
    key_innovation TEXT,
    limitations TEXT
);
";

const PAPER_COLUMNS: &str = "p.id, p.arxiv_id, p.title, p.abstract, p.authors, \
     p.published_date, p.primary_category, p.categories, \
     m.citation_count, m.citation_velocity_7d, m.github_stars, m.github_repos_count, \
     m.social_score, m.overall_rank_score, m.last_metrics_update";

/// Repository over the local-mode SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    path: PathBuf,
}

impl SqliteRepository {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let repo = Self {
            path: path.as_ref().to_path_buf(),
        };
        repo.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::TaskJoin {
            message: e.to_string(),
        })?
    }

    /// Insert or replace a paper with its metrics, implementations and
    /// summary. Used by fixtures and import tooling.
    pub async fn upsert_paper(&self, paper: &Paper) -> Result<(), RepositoryError> {
        let paper = paper.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO papers
                    (id, arxiv_id, title, abstract, authors, published_date, primary_category, categories)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    paper.id,
                    paper.arxiv_id,
                    paper.title,
                    paper.abstract_text,
                    to_json(&paper.authors)?,
                    paper.published_date.format("%Y-%m-%d").to_string(),
                    paper.primary_category,
                    to_json(&paper.categories)?,
                ],
            )?;
            if let Some(m) = &paper.metrics {
                tx.execute(
                    "INSERT OR REPLACE INTO paper_metrics
                        (paper_id, citation_count, citation_velocity_7d, github_stars,
                         github_repos_count, social_score, overall_rank_score, last_metrics_update)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        paper.id,
                        m.citation_count,
                        m.citation_velocity_7d,
                        m.github_stars,
                        m.github_repos_count,
                        m.social_score,
                        m.overall_rank_score,
                        m.last_metrics_update.map(|t| t.to_rfc3339()),
                    ],
                )?;
            }
            tx.execute(
                "DELETE FROM paper_implementations WHERE paper_id = ?1",
                params![paper.id],
            )?;
            for imp in &paper.implementations {
                tx.execute(
                    "INSERT INTO paper_implementations
                        (paper_id, source, repo_url, repo_name, stars, description, language, last_updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        paper.id,
                        imp.source,
                        imp.repo_url,
                        imp.repo_name,
                        imp.stars,
                        imp.description,
                        imp.language,
                        imp.last_updated.map(|t| t.to_rfc3339()),
                    ],
                )?;
            }
            if let Some(s) = &paper.summary {
                tx.execute(
                    "INSERT OR REPLACE INTO paper_summaries
                        (paper_id, one_line_summary, methodology, results_summary, key_innovation, limitations)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        paper.id,
                        s.one_line_summary,
                        s.methodology,
                        s.results_summary,
                        s.key_innovation,
                        s.limitations,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query {
        message: e.to_string(),
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    // Some writers store a full timestamp in the date column.
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| RepositoryError::Query {
        message: format!("bad published_date '{raw}': {e}"),
    })
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Authors are stored either as `[{"name": .., "affiliations": [..]}]` or as
/// a plain list of names.
fn parse_authors(raw: &str) -> Vec<Author> {
    if let Ok(authors) = serde_json::from_str::<Vec<Author>>(raw) {
        return authors;
    }
    serde_json::from_str::<Vec<String>>(raw)
        .map(|names| names.into_iter().map(Author::new).collect())
        .unwrap_or_default()
}

/// Column values read by `PAPER_COLUMNS`, before parsing.
struct PaperRow {
    id: String,
    arxiv_id: String,
    title: String,
    abstract_text: String,
    authors: String,
    published_date: String,
    primary_category: String,
    categories: String,
    metrics: Option<PaperMetrics>,
}

fn read_paper_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaperRow> {
    let citation_count: Option<i64> = row.get(8)?;
    let metrics = match citation_count {
        Some(citation_count) => Some(PaperMetrics {
            citation_count,
            citation_velocity_7d: row.get(9)?,
            github_stars: row.get(10)?,
            github_repos_count: row.get(11)?,
            social_score: row.get(12)?,
            overall_rank_score: row.get(13)?,
            last_metrics_update: parse_timestamp(row.get(14)?),
        }),
        None => None,
    };
    Ok(PaperRow {
        id: row.get(0)?,
        arxiv_id: row.get(1)?,
        title: row.get(2)?,
        abstract_text: row.get(3)?,
        authors: row.get(4)?,
        published_date: row.get(5)?,
        primary_category: row.get(6)?,
        categories: row.get(7)?,
        metrics,
    })
}

fn hydrate(conn: &Connection, row: PaperRow) -> Result<Paper, RepositoryError> {
    let mut stmt = conn.prepare_cached(
        "SELECT source, repo_url, repo_name, stars, description, language, last_updated
         FROM paper_implementations WHERE paper_id = ?1",
    )?;
    let implementations = stmt
        .query_map(params![row.id], |r| {
            Ok(Implementation {
                source: r.get(0)?,
                repo_url: r.get(1)?,
                repo_name: r.get(2)?,
                stars: r.get(3)?,
                description: r.get(4)?,
                language: r.get(5)?,
                last_updated: parse_timestamp(r.get(6)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let summary = conn
        .prepare_cached(
            "SELECT one_line_summary, methodology, results_summary, key_innovation, limitations
             FROM paper_summaries WHERE paper_id = ?1",
        )?
        .query_row(params![row.id], |r| {
            Ok(PaperSummary {
                one_line_summary: r.get(0)?,
                methodology: r.get(1)?,
                results_summary: r.get(2)?,
                key_innovation: r.get(3)?,
                limitations: r.get(4)?,
            })
        })
        .optional()?;

    Ok(Paper {
        published_date: parse_date(&row.published_date)?,
        authors: parse_authors(&row.authors),
        categories: serde_json::from_str(&row.categories).unwrap_or_default(),
        id: row.id,
        arxiv_id: row.arxiv_id,
        title: row.title,
        abstract_text: row.abstract_text,
        primary_category: row.primary_category,
        implementations,
        summary,
        metrics: row.metrics,
    })
}

fn query_papers(
    conn: &Connection,
    where_clause: &str,
    order_clause: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Paper>, RepositoryError> {
    let sql = format!(
        "SELECT {PAPER_COLUMNS} FROM papers p
         LEFT JOIN paper_metrics m ON m.paper_id = p.id
         WHERE {where_clause} {order_clause}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, read_paper_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(|row| hydrate(conn, row)).collect()
}

#[async_trait]
impl PaperRepository for SqliteRepository {
    async fn papers_since(
        &self,
        since: NaiveDate,
        category: Option<&str>,
    ) -> Result<Vec<Paper>, RepositoryError> {
        let since = since.format("%Y-%m-%d").to_string();
        let category = category.map(str::to_string);
        self.with_conn(move |conn| match &category {
            Some(category) => query_papers(
                conn,
                "p.published_date >= ?1 AND p.primary_category = ?2",
                "ORDER BY p.id",
                &[&since, category],
            ),
            None => query_papers(conn, "p.published_date >= ?1", "ORDER BY p.id", &[&since]),
        })
        .await
    }

    async fn category_metrics(
        &self,
        category: &str,
        since: NaiveDate,
    ) -> Result<Vec<PaperMetrics>, RepositoryError> {
        let since = since.format("%Y-%m-%d").to_string();
        let category = category.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT m.citation_count, m.citation_velocity_7d, m.github_stars,
                        m.github_repos_count, m.social_score, m.overall_rank_score,
                        m.last_metrics_update
                 FROM paper_metrics m JOIN papers p ON p.id = m.paper_id
                 WHERE p.primary_category = ?1 AND p.published_date >= ?2",
            )?;
            let metrics = stmt
                .query_map(params![category, since], |r| {
                    Ok(PaperMetrics {
                        citation_count: r.get(0)?,
                        citation_velocity_7d: r.get(1)?,
                        github_stars: r.get(2)?,
                        github_repos_count: r.get(3)?,
                        social_score: r.get(4)?,
                        overall_rank_score: r.get(5)?,
                        last_metrics_update: parse_timestamp(r.get(6)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(metrics)
        })
        .await
    }

    async fn recent_paper_ids(
        &self,
        category: &str,
        exclude_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError> {
        let category = category.to_string();
        let exclude_id = exclude_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM papers
                 WHERE primary_category = ?1 AND id != ?2
                 ORDER BY published_date DESC, id
                 LIMIT ?3",
            )?;
            let ids = stmt
                .query_map(params![category, exclude_id, limit], |r| r.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn paper(&self, id: &str) -> Result<Option<Paper>, RepositoryError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut papers = query_papers(conn, "p.id = ?1", "", &[&id])?;
            Ok(papers.pop())
        })
        .await
    }

    async fn papers_by_ids(&self, ids: &[String]) -> Result<Vec<Paper>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        self.with_conn(move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let params: Vec<&dyn rusqlite::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
            let found = query_papers(conn, &format!("p.id IN ({placeholders})"), "", &params)?;
            let mut by_id: HashMap<String, Paper> =
                found.into_iter().map(|p| (p.id.clone(), p)).collect();
            Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
        })
        .await
    }

    async fn top_ranked(
        &self,
        since: NaiveDate,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Paper>, RepositoryError> {
        let since = since.format("%Y-%m-%d").to_string();
        let category = category.map(str::to_string);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let order = "ORDER BY COALESCE(m.overall_rank_score, 0) DESC, p.published_date DESC LIMIT ?";
            match &category {
                Some(category) => query_papers(
                    conn,
                    "p.published_date >= ? AND p.primary_category = ?",
                    order,
                    &[&since, category, &limit],
                ),
                None => query_papers(conn, "p.published_date >= ?", order, &[&since, &limit]),
            }
        })
        .await
    }

    async fn update_rank_score(&self, paper_id: &str, score: f64) -> Result<(), RepositoryError> {
        let paper_id = paper_id.to_string();
        self.with_conn(move |conn| {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM papers WHERE id = ?1",
                    params![paper_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !exists {
                return Err(RepositoryError::Query {
                    message: format!("paper '{paper_id}' not found"),
                });
            }
            conn.execute(
                "INSERT INTO paper_metrics (paper_id, overall_rank_score) VALUES (?1, ?2)
                 ON CONFLICT(paper_id) DO UPDATE SET overall_rank_score = excluded.overall_rank_score",
                params![paper_id, score],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixture() -> Vec<Paper> {
        let mut a = Paper::new("a", "Scaling Laws", "cs.LG", date(2025, 5, 20));
        a.authors = vec![Author::new("Ada"), Author::new("Grace")];
        a.metrics = Some(PaperMetrics {
            citation_count: 12,
            citation_velocity_7d: 4,
            overall_rank_score: 0.4,
            ..Default::default()
        });
        a.implementations = vec![Implementation {
            source: "github".into(),
            repo_url: "https://github.com/x/scaling".into(),
            repo_name: "x/scaling".into(),
            stars: 120,
            description: None,
            language: Some("Python".into()),
            last_updated: None,
        }];
        a.summary = Some(PaperSummary {
            one_line_summary: "Bigger is better".into(),
            methodology: Some("Sweep".into()),
            ..Default::default()
        });

        let mut b = Paper::new("b", "Vision Tricks", "cs.CV", date(2025, 5, 25));
        b.metrics = Some(PaperMetrics {
            citation_count: 2,
            overall_rank_score: 0.9,
            ..Default::default()
        });

        let c = Paper::new("c", "Old News", "cs.LG", date(2024, 1, 1));
        let d = Paper::new("d", "Fresh Unscored", "cs.LG", date(2025, 5, 28));
        vec![a, b, c, d]
    }

    async fn check_contract(repo: &dyn PaperRepository) {
        let since = date(2025, 5, 1);

        let recent = repo.papers_since(since, None).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);

        let lg = repo.papers_since(since, Some("cs.LG")).await.unwrap();
        assert_eq!(lg.len(), 2);
        let a = lg.iter().find(|p| p.id == "a").unwrap();
        assert_eq!(a.authors.len(), 2);
        assert_eq!(a.implementations[0].stars, 120);
        assert!(a.summary.as_ref().unwrap().has_methodology());

        let metrics = repo.category_metrics("cs.LG", since).await.unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].citation_count, 12);

        let recent_ids = repo.recent_paper_ids("cs.LG", "a", 10).await.unwrap();
        assert_eq!(recent_ids, vec!["d".to_string(), "c".to_string()]);

        let by_ids = repo
            .papers_by_ids(&["d".into(), "missing".into(), "a".into()])
            .await
            .unwrap();
        let ids: Vec<&str> = by_ids.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a"]);

        let top = repo.top_ranked(since, None, 2).await.unwrap();
        let ids: Vec<&str> = top.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        repo.update_rank_score("d", 0.95).await.unwrap();
        let d = repo.paper("d").await.unwrap().unwrap();
        assert_eq!(d.metrics.unwrap().overall_rank_score, 0.95);
        let top = repo.top_ranked(since, Some("cs.LG"), 1).await.unwrap();
        assert_eq!(top[0].id, "d");

        assert!(repo.update_rank_score("missing", 0.1).await.is_err());
        assert!(repo.paper("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_repository_contract() {
        let repo = InMemoryRepository::with_papers(fixture());
        check_contract(&repo).await;
    }

    #[tokio::test]
    async fn test_sqlite_repository_contract() {
        let dir = TempDir::new().unwrap();
        let repo = SqliteRepository::open(dir.path().join("radar.db"))
            .await
            .unwrap();
        for paper in fixture() {
            repo.upsert_paper(&paper).await.unwrap();
        }
        check_contract(&repo).await;
    }

    #[tokio::test]
    async fn test_sqlite_roundtrips_paper() {
        let dir = TempDir::new().unwrap();
        let repo = SqliteRepository::open(dir.path().join("radar.db"))
            .await
            .unwrap();
        let original = fixture().remove(0);
        repo.upsert_paper(&original).await.unwrap();
        let loaded = repo.paper("a").await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_parse_authors_accepts_plain_names() {
        let authors = parse_authors(r#"["Ada", "Grace"]"#);
        assert_eq!(authors, vec![Author::new("Ada"), Author::new("Grace")]);
        assert!(parse_authors("not json").is_empty());
    }

    #[test]
    fn test_parse_date_accepts_timestamps() {
        assert_eq!(parse_date("2025-05-20 00:00:00").unwrap(), date(2025, 5, 20));
        assert!(parse_date("yesterday").is_err());
    }
}

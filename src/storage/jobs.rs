//! SQLite-backed job store.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::crawler::ValidatedJobRecord;

use super::{JobStore, StoreError};

/// Default number of jobs per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT    NOT NULL UNIQUE,
    created_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id  INTEGER NOT NULL REFERENCES companies(id),
    title       TEXT    NOT NULL,
    company     TEXT    NOT NULL,
    location    TEXT    NOT NULL,
    career      TEXT    NOT NULL,
    education   TEXT    NOT NULL,
    salary      TEXT    NOT NULL,

    -- Comma-separated tag lists
    sectors     TEXT    NOT NULL DEFAULT '',
    tech_stack  TEXT,

    link        TEXT    NOT NULL UNIQUE,
    position    TEXT,

    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_company ON jobs(company_id);
"#;

const JOB_COLUMNS: &str = "id, company_id, title, company, location, career, education, salary, \
     sectors, link, position, tech_stack, created_at, updated_at";

/// A company row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A stored job posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedJob {
    pub id: i64,
    pub company_id: i64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub career: String,
    pub education: String,
    pub salary: String,
    pub sectors: Vec<String>,
    pub link: String,
    pub position: Option<String>,
    pub tech_stack: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Substring filters for [`SqliteJobStore::list_jobs`].
///
/// Every set field must match; matching is a case-insensitive `LIKE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub location: Option<String>,
    pub career: Option<String>,
    pub education: Option<String>,
    pub salary: Option<String>,
    pub sectors: Option<String>,
    /// Matched against the title.
    pub search: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub tech_stack: Option<String>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_sectors(mut self, sectors: impl Into<String>) -> Self {
        self.sectors = Some(sectors.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Column and `LIKE` pattern for every set, non-blank field.
    fn conditions(&self) -> Vec<(&'static str, String)> {
        [
            ("location", &self.location),
            ("career", &self.career),
            ("education", &self.education),
            ("salary", &self.salary),
            ("sectors", &self.sectors),
            ("title", &self.search),
            ("company", &self.company),
            ("position", &self.position),
            ("tech_stack", &self.tech_stack),
        ]
        .into_iter()
        .filter_map(|(column, value)| {
            let value = value.as_deref()?.trim();
            (!value.is_empty()).then(|| (column, format!("%{}%", value)))
        })
        .collect()
    }
}

/// One page of [`SqliteJobStore::list_jobs`] results, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<PersistedJob>,
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

/// Row counts written by [`SqliteJobStore::export_json`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub companies: usize,
    pub jobs: usize,
}

#[derive(Serialize)]
struct ExportDocument {
    exported_at: DateTime<Utc>,
    companies: Vec<Company>,
    jobs: Vec<PersistedJob>,
}

/// Job store backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Opens (creating if needed) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self::with_pool(pool).await?;
        tracing::info!(path = %path.display(), "Job store opened");
        Ok(store)
    }

    /// Opens a private in-memory database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        // Each connection to :memory: is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns one page of stored jobs matching `filter`.
    ///
    /// `page` is 1-based; 0 is treated as 1. A `page_size` of 0 uses
    /// [`DEFAULT_PAGE_SIZE`].
    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: u32,
        page_size: u32,
    ) -> Result<JobPage, StoreError> {
        let page = page.max(1);
        let page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };

        let conditions = filter.conditions();
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            let clauses: Vec<String> = conditions
                .iter()
                .map(|(column, _)| format!("{} LIKE ?", column))
                .collect();
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS total FROM jobs{}", where_clause);
        let mut count_query = sqlx::query(&count_sql);
        for (_, pattern) in &conditions {
            count_query = count_query.bind(pattern);
        }
        let total_items = count_query
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("total")? as u64;

        let select_sql = format!(
            "SELECT {} FROM jobs{} ORDER BY id DESC LIMIT ? OFFSET ?",
            JOB_COLUMNS, where_clause
        );
        let mut select_query = sqlx::query(&select_sql);
        for (_, pattern) in &conditions {
            select_query = select_query.bind(pattern);
        }
        let offset = i64::from(page - 1) * i64::from(page_size);
        let rows = select_query
            .bind(i64::from(page_size))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let jobs = rows
            .iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(JobPage {
            jobs,
            page,
            page_size,
            total_items,
            total_pages: total_items.div_ceil(u64::from(page_size)),
        })
    }

    /// Returns every company, ordered by name.
    pub async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM companies ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        let companies = rows
            .iter()
            .map(company_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(companies)
    }

    /// Returns a job by its link.
    pub async fn get_job(&self, link: &str) -> Result<Option<PersistedJob>, StoreError> {
        let sql = format!("SELECT {} FROM jobs WHERE link = ?1", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(job_from_row).transpose()?)
    }

    /// Writes every company and job to `path` as pretty-printed JSON.
    pub async fn export_json(&self, path: impl AsRef<Path>) -> Result<ExportSummary, StoreError> {
        let path = path.as_ref();
        let companies = self.list_companies().await?;

        let sql = format!("SELECT {} FROM jobs ORDER BY id", JOB_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let jobs = rows
            .iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let summary = ExportSummary {
            companies: companies.len(),
            jobs: jobs.len(),
        };

        let document = ExportDocument {
            exported_at: Utc::now(),
            companies,
            jobs,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(&document)?).await?;

        tracing::info!(
            path = %path.display(),
            companies = summary.companies,
            jobs = summary.jobs,
            "Exported job store"
        );
        Ok(summary)
    }

    async fn resolve_company(
        conn: &mut SqliteConnection,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        sqlx::query("INSERT OR IGNORE INTO companies (name, created_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        let row = sqlx::query("SELECT id FROM companies WHERE name = ?1")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;

        Ok(row.try_get("id")?)
    }

    async fn upsert_job(
        conn: &mut SqliteConnection,
        company_id: i64,
        record: &ValidatedJobRecord,
        now: DateTime<Utc>,
    ) -> Result<PersistedJob, StoreError> {
        let row = sqlx::query(
            "INSERT INTO jobs (
                company_id, title, company, location, career, education, salary,
                sectors, link, position, tech_stack, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?12)
            ON CONFLICT(link) DO UPDATE SET
                company_id = excluded.company_id,
                title = excluded.title,
                company = excluded.company,
                location = excluded.location,
                career = excluded.career,
                education = excluded.education,
                salary = excluded.salary,
                sectors = excluded.sectors,
                position = COALESCE(excluded.position, jobs.position),
                tech_stack = COALESCE(excluded.tech_stack, jobs.tech_stack),
                updated_at = excluded.updated_at
            RETURNING id, position, tech_stack, created_at",
        )
        .bind(company_id)
        .bind(record.title())
        .bind(record.company())
        .bind(record.location())
        .bind(record.career())
        .bind(record.education())
        .bind(record.salary())
        .bind(join_tags(record.sectors()))
        .bind(record.link())
        .bind(record.position())
        .bind(Some(join_tags(record.tech_stack())).filter(|s| !s.is_empty()))
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(PersistedJob {
            id: row.try_get("id")?,
            company_id,
            title: record.title().to_string(),
            company: record.company().to_string(),
            location: record.location().to_string(),
            career: record.career().to_string(),
            education: record.education().to_string(),
            salary: record.salary().to_string(),
            sectors: record.sectors().to_vec(),
            link: record.link().to_string(),
            position: row.try_get("position")?,
            tech_stack: split_tags(row.try_get::<Option<String>, _>("tech_stack")?.as_deref()),
            created_at: row.try_get("created_at")?,
            updated_at: now,
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enrich_and_store(
        &self,
        records: &[ValidatedJobRecord],
    ) -> Result<Vec<PersistedJob>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(records.len());

        for record in records {
            let company_id = Self::resolve_company(&mut *tx, record.company(), now).await?;
            stored.push(Self::upsert_job(&mut *tx, company_id, record, now).await?);
        }

        tx.commit().await?;

        tracing::info!(jobs = stored.len(), "Stored crawled jobs");
        Ok(stored)
    }
}

fn company_from_row(row: &SqliteRow) -> Result<Company, sqlx::Error> {
    Ok(Company {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<PersistedJob, sqlx::Error> {
    Ok(PersistedJob {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        title: row.try_get("title")?,
        company: row.try_get("company")?,
        location: row.try_get("location")?,
        career: row.try_get("career")?,
        education: row.try_get("education")?,
        salary: row.try_get("salary")?,
        sectors: split_tags(row.try_get::<Option<String>, _>("sectors")?.as_deref()),
        link: row.try_get("link")?,
        position: row.try_get("position")?,
        tech_stack: split_tags(row.try_get::<Option<String>, _>("tech_stack")?.as_deref()),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

fn split_tags(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::record::{sample_record, validate};

    fn job(link: &str) -> ValidatedJobRecord {
        validate(sample_record(link)).expect("sample record is complete")
    }

    fn job_with(link: &str, edit: impl FnOnce(&mut crate::crawler::RawJobRecord)) -> ValidatedJobRecord {
        let mut record = sample_record(link);
        edit(&mut record);
        validate(record).expect("edited record is complete")
    }

    #[tokio::test]
    async fn test_store_and_read_back() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        let stored = store
            .enrich_and_store(&[job("https://jobs.example.com/1")])
            .await
            .unwrap();

        assert_eq!(stored.len(), 1);
        let fetched = store
            .get_job("https://jobs.example.com/1")
            .await
            .unwrap()
            .expect("job should exist");
        assert_eq!(fetched.id, stored[0].id);
        assert_eq!(fetched.company, "Acme Corp");
        assert_eq!(fetched.sectors, ["Backend", "Server"]);
        assert!(fetched.tech_stack.is_empty());
        assert_eq!(fetched.position, None);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_link() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        let first = store
            .enrich_and_store(&[job("https://jobs.example.com/1")])
            .await
            .unwrap();

        let updated = job_with("https://jobs.example.com/1", |r| {
            r.salary = "50,000,000 KRW".to_string()
        });
        let second = store.enrich_and_store(&[updated]).await.unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].created_at, second[0].created_at);

        let page = store.list_jobs(&JobFilter::new(), 1, 20).await.unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.jobs[0].salary, "50,000,000 KRW");
    }

    #[tokio::test]
    async fn test_companies_are_shared_by_name() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        let stored = store
            .enrich_and_store(&[
                job("https://jobs.example.com/1"),
                job("https://jobs.example.com/2"),
                job_with("https://jobs.example.com/3", |r| r.company = "Globex".to_string()),
            ])
            .await
            .unwrap();

        assert_eq!(stored[0].company_id, stored[1].company_id);
        assert_ne!(stored[0].company_id, stored[2].company_id);

        let companies = store.list_companies().await.unwrap();
        let names: Vec<&str> = companies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Acme Corp", "Globex"]);
    }

    #[tokio::test]
    async fn test_list_jobs_filters() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        store
            .enrich_and_store(&[
                job("https://jobs.example.com/1"),
                job_with("https://jobs.example.com/2", |r| {
                    r.title = "Data Analyst".to_string();
                    r.location = "Busan Haeundae-gu".to_string();
                    r.sectors = vec!["Data".to_string()];
                }),
                job_with("https://jobs.example.com/3", |r| {
                    r.tech_stack = vec!["Rust".to_string(), "Tokio".to_string()];
                }),
            ])
            .await
            .unwrap();

        let busan = store
            .list_jobs(&JobFilter::new().with_location("busan"), 1, 20)
            .await
            .unwrap();
        assert_eq!(busan.total_items, 1);
        assert_eq!(busan.jobs[0].title, "Data Analyst");

        let backend = store
            .list_jobs(&JobFilter::new().with_search("engineer").with_sectors("Backend"), 1, 20)
            .await
            .unwrap();
        assert_eq!(backend.total_items, 2);

        let rust = JobFilter {
            tech_stack: Some("rust".to_string()),
            ..Default::default()
        };
        let rust = store.list_jobs(&rust, 1, 20).await.unwrap();
        assert_eq!(rust.total_items, 1);
        assert_eq!(rust.jobs[0].tech_stack, ["Rust", "Tokio"]);

        let blank = store
            .list_jobs(&JobFilter::new().with_company("  "), 1, 20)
            .await
            .unwrap();
        assert_eq!(blank.total_items, 3);
    }

    #[tokio::test]
    async fn test_list_jobs_paginates_newest_first() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        let records: Vec<_> = (1..=25)
            .map(|i| job(&format!("https://jobs.example.com/{}", i)))
            .collect();
        store.enrich_and_store(&records).await.unwrap();

        let first = store.list_jobs(&JobFilter::new(), 1, 10).await.unwrap();
        assert_eq!(first.total_items, 25);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.jobs.len(), 10);
        assert_eq!(first.jobs[0].link, "https://jobs.example.com/25");

        let last = store.list_jobs(&JobFilter::new(), 3, 10).await.unwrap();
        assert_eq!(last.jobs.len(), 5);
        assert_eq!(last.jobs[4].link, "https://jobs.example.com/1");

        let beyond = store.list_jobs(&JobFilter::new(), 4, 10).await.unwrap();
        assert!(beyond.jobs.is_empty());

        let defaulted = store.list_jobs(&JobFilter::new(), 0, 0).await.unwrap();
        assert_eq!(defaulted.page, 1);
        assert_eq!(defaulted.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(defaulted.jobs.len(), 20);
    }

    #[tokio::test]
    async fn test_export_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteJobStore::open(dir.path().join("jobs.db")).await.unwrap();
        store
            .enrich_and_store(&[
                job("https://jobs.example.com/1"),
                job("https://jobs.example.com/2"),
            ])
            .await
            .unwrap();

        let output = dir.path().join("out").join("crawled_data.json");
        let summary = store.export_json(&output).await.unwrap();
        assert_eq!(summary, ExportSummary { companies: 1, jobs: 2 });

        let content = std::fs::read_to_string(&output).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["companies"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["jobs"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["jobs"][0]["link"], "https://jobs.example.com/1");
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        assert!(store.enrich_and_store(&[]).await.unwrap().is_empty());
        assert!(store.list_companies().await.unwrap().is_empty());
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags(Some("a, b,,c ")), ["a", "b", "c"]);
        assert!(split_tags(None).is_empty());
        assert!(split_tags(Some("")).is_empty());
    }
}

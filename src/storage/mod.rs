//! SQLite persistence for crawled jobs.
//!
//! The crawler hands validated records to a [`JobStore`], which resolves each
//! record's company and upserts the job on its link.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jobboard::storage::{JobFilter, JobStore, SqliteJobStore};
//!
//! let store = SqliteJobStore::open("jobboard.db").await?;
//! store.enrich_and_store(&report.records).await?;
//!
//! let filter = JobFilter::new().with_location("Seoul");
//! let page = store.list_jobs(&filter, 1, 20).await?;
//! ```

pub mod jobs;

use async_trait::async_trait;
use thiserror::Error;

use crate::crawler::ValidatedJobRecord;

pub use jobs::{Company, ExportSummary, JobFilter, JobPage, PersistedJob, SqliteJobStore};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the database failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// Writing an export file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing an export failed.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for validated crawl results.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists records, creating their companies as needed.
    ///
    /// Records are upserted on their link, so storing the same crawl twice
    /// leaves one row per posting. Returns the stored rows in input order.
    async fn enrich_and_store(
        &self,
        records: &[ValidatedJobRecord],
    ) -> Result<Vec<PersistedJob>, StoreError>;
}

//! jobboard: concurrent job-listing crawler.
//!
//! This library crawls paginated job listings with a bounded pool of
//! workers, keeps postings that carry every required field and persists
//! them to SQLite.

pub mod cli;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use crawler::{CrawlConfig, CrawlReport, Crawler, RawJobRecord, ValidatedJobRecord};
pub use error::{CrawlError, FetchError, SessionError};
pub use storage::{JobStore, SqliteJobStore, StoreError};

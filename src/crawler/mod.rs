//! Concurrent job-listing crawler.
//!
//! A crawl fetches listing pages `1..=page_count` through one shared
//! [`FetchSession`], keeps records that carry every required field and stops
//! once `result_cap` records are collected.
//!
//! - [`record`]: raw and validated job records, the record filter
//! - [`fetcher`]: the session traits the pool fetches through
//! - [`listing`]: HTTP session with configurable CSS selectors
//! - [`pool`]: work queue, results accumulator and workers
//! - [`orchestrator`]: session lifecycle around one pool run
//! - [`config`]: crawl configuration from env and builders
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use jobboard::crawler::{CrawlConfig, Crawler, HttpSessionFactory, ListingConfig};
//!
//! let factory = Arc::new(HttpSessionFactory::new(ListingConfig::default()));
//! let crawler = Crawler::new(factory, CrawlConfig::new(20, 5));
//! let report = crawler.crawl().await?;
//! println!("{} jobs", report.len());
//! ```

pub mod config;
pub mod fetcher;
pub mod listing;
pub mod orchestrator;
pub mod pool;
pub mod record;

pub use config::{
    ConfigError, CrawlConfig, DEFAULT_CONCURRENCY, DEFAULT_PAGE_COUNT, DEFAULT_RESULT_CAP,
};
pub use fetcher::{FetchSession, SessionFactory};
pub use listing::{
    parse_listing, CompiledSelectors, HttpSession, HttpSessionFactory, ListingConfig,
    ListingSelectors,
};
pub use orchestrator::{CrawlReport, Crawler};
pub use pool::{PoolOutcome, PoolStats, ResultsAccumulator, WorkQueue, WorkerPool};
pub use record::{filter_records, validate, PageNumber, RawJobRecord, ValidatedJobRecord};

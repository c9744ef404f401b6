//! Crawl orchestrator: session lifecycle around one pool run.
//!
//! The orchestrator opens one fetch session, runs the [`WorkerPool`] against
//! it, closes the session on every exit path and truncates the collected
//! records to the configured cap.
//!
//! Record order in a [`CrawlReport`] follows page completion across workers,
//! not page number order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{CrawlError, SessionError};
use crate::metrics::MetricsCollector;

use super::config::CrawlConfig;
use super::fetcher::SessionFactory;
use super::pool::{PoolStats, WorkerPool};
use super::record::ValidatedJobRecord;

/// Result of a completed crawl.
#[derive(Debug)]
pub struct CrawlReport {
    /// Identifier attached to every log line of this crawl.
    pub crawl_id: Uuid,
    /// Validated records, at most `result_cap` of them.
    pub records: Vec<ValidatedJobRecord>,
    /// Pool statistics.
    pub stats: PoolStats,
    /// Set when closing the fetch session failed after the crawl finished.
    /// The records are still valid.
    pub teardown_error: Option<SessionError>,
    /// Wall-clock duration of the crawl.
    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Runs crawls against sessions produced by a [`SessionFactory`].
pub struct Crawler {
    factory: Arc<dyn SessionFactory>,
    config: CrawlConfig,
    metrics: MetricsCollector,
}

impl Crawler {
    /// Creates a crawler.
    ///
    /// # Arguments
    ///
    /// * `factory` - Source of the fetch session used by each crawl
    /// * `config` - Crawl configuration, validated when a crawl starts
    pub fn new(factory: Arc<dyn SessionFactory>, config: CrawlConfig) -> Self {
        Self {
            factory,
            config,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Runs one crawl end to end.
    ///
    /// Pages that fail to fetch are skipped; a crawl where every page failed
    /// still succeeds with an empty record list.
    ///
    /// # Errors
    ///
    /// - `CrawlError::InvalidConfig` if the configuration is invalid
    /// - `CrawlError::SessionAcquisition` if the session cannot be opened;
    ///   no page is fetched in that case
    pub async fn crawl(&self) -> Result<CrawlReport, CrawlError> {
        self.config
            .validate()
            .map_err(|e| CrawlError::InvalidConfig(e.to_string()))?;

        let crawl_id = Uuid::new_v4();
        let span = info_span!("crawl", crawl_id = %crawl_id);

        self.crawl_inner(crawl_id).instrument(span).await
    }

    async fn crawl_inner(&self, crawl_id: Uuid) -> Result<CrawlReport, CrawlError> {
        let start_time = Instant::now();

        info!(
            pages = self.config.page_count,
            concurrency = self.config.concurrency,
            result_cap = self.config.result_cap,
            "Starting crawl"
        );

        let session = match self.factory.open().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Failed to open fetch session");
                self.metrics
                    .record_crawl(false, start_time.elapsed().as_secs_f64());
                return Err(CrawlError::SessionAcquisition(e));
            }
        };

        let pool = WorkerPool::new(self.config.clone(), Arc::clone(&session));
        let outcome = pool.run().await;

        let teardown_error = match session.close().await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Failed to close fetch session");
                Some(e)
            }
        };

        let mut records = outcome.records;
        if records.len() > self.config.result_cap {
            debug!(
                collected = records.len(),
                result_cap = self.config.result_cap,
                "Truncating records to cap"
            );
            records.truncate(self.config.result_cap);
        }

        let elapsed = start_time.elapsed();
        self.metrics.record_crawl(true, elapsed.as_secs_f64());

        info!(
            records = records.len(),
            pages_fetched = outcome.stats.pages_fetched,
            pages_failed = outcome.stats.pages_failed,
            duration_ms = elapsed.as_millis() as u64,
            "Crawl complete"
        );

        Ok(CrawlReport {
            crawl_id,
            records,
            stats: outcome.stats,
            teardown_error,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_len() {
        let report = CrawlReport {
            crawl_id: Uuid::new_v4(),
            records: Vec::new(),
            stats: PoolStats::default(),
            teardown_error: None,
            elapsed: Duration::ZERO,
        };

        assert!(report.is_empty());
        assert_eq!(report.len(), 0);
    }
}

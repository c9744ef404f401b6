//! Metric recording helpers for crawl operations.
//!
//! `MetricsCollector` wraps the raw Prometheus metrics with consistent labels.
//! Every method is a no-op until `init_metrics()` has been called, so library
//! users that never initialize metrics pay nothing beyond a `OnceLock` load.

use super::prometheus::{
    ACTIVE_WORKERS, CRAWLS_TOTAL, CRAWL_DURATION, PAGES_TOTAL, PAGE_FETCH_DURATION, QUEUE_DEPTH,
    RECORDS_TOTAL,
};

/// Outcome label for a processed listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Fetched,
    Failed,
}

impl PageOutcome {
    fn as_label(self) -> &'static str {
        match self {
            PageOutcome::Fetched => "fetched",
            PageOutcome::Failed => "failed",
        }
    }
}

/// Outcome label for a scraped record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Accepted,
    Rejected,
    Duplicate,
}

impl RecordOutcome {
    fn as_label(self) -> &'static str {
        match self {
            RecordOutcome::Accepted => "accepted",
            RecordOutcome::Rejected => "rejected",
            RecordOutcome::Duplicate => "duplicate",
        }
    }
}

/// Metrics collector for recording crawl metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one processed page and how long its fetch took.
    pub fn record_page(&self, outcome: PageOutcome, duration_secs: f64) {
        if let Some(pages) = PAGES_TOTAL.get() {
            pages.with_label_values(&[outcome.as_label()]).inc();
        }

        if let Some(latency) = PAGE_FETCH_DURATION.get() {
            latency.observe(duration_secs);
        }
    }

    /// Record `count` records with the same outcome.
    pub fn record_records(&self, outcome: RecordOutcome, count: usize) {
        if count == 0 {
            return;
        }

        if let Some(records) = RECORDS_TOTAL.get() {
            records
                .with_label_values(&[outcome.as_label()])
                .inc_by(count as f64);
        }
    }

    /// Record a finished crawl.
    pub fn record_crawl(&self, success: bool, duration_secs: f64) {
        let outcome = if success { "completed" } else { "failed" };

        if let Some(crawls) = CRAWLS_TOTAL.get() {
            crawls.with_label_values(&[outcome]).inc();
        }

        if let Some(duration) = CRAWL_DURATION.get() {
            duration.observe(duration_secs);
        }

        tracing::trace!(outcome, duration_secs, "Recorded crawl metric");
    }

    pub fn set_queue_depth(&self, depth: usize) {
        if let Some(gauge) = QUEUE_DEPTH.get() {
            gauge.set(depth as f64);
        }
    }

    pub fn worker_started(&self) {
        if let Some(gauge) = ACTIVE_WORKERS.get() {
            gauge.inc();
        }
    }

    pub fn worker_stopped(&self) {
        if let Some(gauge) = ACTIVE_WORKERS.get() {
            gauge.dec();
        }
    }
}

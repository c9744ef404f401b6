//! Prometheus metrics registration and export.
//!
//! This module defines the Prometheus metrics recorded by crawls and provides
//! functions for initializing, registering, and exporting them.

use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::{Mutex, OnceLock};

/// Serializes initialization so every metric lands in the same registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Global Prometheus registry for all jobboard metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total listing pages processed, labeled by status (fetched/failed).
pub static PAGES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Page fetch latency in seconds.
pub static PAGE_FETCH_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Total scraped records, labeled by outcome (accepted/rejected/duplicate).
pub static RECORDS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total crawls run, labeled by outcome (completed/failed).
pub static CRAWLS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Crawl duration in seconds.
pub static CRAWL_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Number of page numbers still waiting in the work queue.
pub static QUEUE_DEPTH: OnceLock<Gauge> = OnceLock::new();

/// Number of active crawl workers.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Safe to call more than once; later calls leave the first registry in
/// place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric creation or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let pages_total = CounterVec::new(
        Opts::new("jobboard_pages_total", "Total listing pages processed"),
        &["status"],
    )?;

    let page_fetch_duration = Histogram::with_opts(
        HistogramOpts::new(
            "jobboard_page_fetch_duration_seconds",
            "Listing page fetch latency in seconds",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )?;

    let records_total = CounterVec::new(
        Opts::new("jobboard_records_total", "Total scraped job records"),
        &["outcome"],
    )?;

    let crawls_total = CounterVec::new(
        Opts::new("jobboard_crawls_total", "Total crawls run"),
        &["outcome"],
    )?;

    let crawl_duration = Histogram::with_opts(
        HistogramOpts::new("jobboard_crawl_duration_seconds", "Crawl duration in seconds")
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
    )?;

    let queue_depth = Gauge::new(
        "jobboard_queue_depth",
        "Page numbers waiting in the work queue",
    )?;

    let active_workers = Gauge::new("jobboard_active_workers", "Number of active crawl workers")?;

    registry.register(Box::new(pages_total.clone()))?;
    registry.register(Box::new(page_fetch_duration.clone()))?;
    registry.register(Box::new(records_total.clone()))?;
    registry.register(Box::new(crawls_total.clone()))?;
    registry.register(Box::new(crawl_duration.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;

    let _ = PAGES_TOTAL.set(pages_total);
    let _ = PAGE_FETCH_DURATION.set(page_fetch_duration);
    let _ = RECORDS_TOTAL.set(records_total);
    let _ = CRAWLS_TOTAL.set(crawls_total);
    let _ = CRAWL_DURATION.set(crawl_duration);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = ACTIVE_WORKERS.set(active_workers);
    let _ = REGISTRY.set(registry);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line instead when the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(REGISTRY.get().is_some());
    }

    #[test]
    fn test_metrics_after_init() {
        let _ = init_metrics();

        if let Some(pages) = PAGES_TOTAL.get() {
            pages.with_label_values(&["fetched"]).inc();
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        assert!(metrics.contains("jobboard_pages_total"));
    }
}

//! Prometheus-based crawl metrics.
//!
//! # Example
//!
//! ```ignore
//! use jobboard::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run a crawl ...
//! std::fs::write("crawl.prom", export_metrics())?;
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{MetricsCollector, PageOutcome, RecordOutcome};
pub use prometheus::{export_metrics, init_metrics, REGISTRY};

//! Worker pool that crawls a queue of listing pages.
//!
//! `concurrency` workers share one [`WorkQueue`] of page numbers and one
//! [`ResultsAccumulator`]. Each worker loops:
//!
//! 1. stop if the accumulator already holds `result_cap` records;
//! 2. pop the next page number (FIFO), stop if the queue is empty;
//! 3. fetch the page, filter its records, append the survivors.
//!
//! A failed page is logged and skipped; it never stops the pool. The cap is
//! checked only at the top of the loop, so a page that is in flight when the
//! cap is reached still appends its records. Callers truncate afterwards.
//!
//! When a deadline is configured and elapses, a shutdown signal makes every
//! worker abandon its in-flight fetch; the records accumulated so far are
//! still returned.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn, Instrument};

use crate::error::FetchError;
use crate::metrics::{MetricsCollector, PageOutcome, RecordOutcome};

use super::config::CrawlConfig;
use super::fetcher::FetchSession;
use super::record::{filter_records, PageNumber, RawJobRecord, ValidatedJobRecord};

/// FIFO queue of page numbers shared by all workers.
///
/// Each page number is present at most once and the queue only shrinks.
#[derive(Debug)]
pub struct WorkQueue {
    pages: Mutex<VecDeque<PageNumber>>,
}

impl WorkQueue {
    /// Creates a queue from page numbers, keeping the first occurrence of
    /// each.
    pub fn new(pages: impl IntoIterator<Item = PageNumber>) -> Self {
        let mut seen = HashSet::new();
        let pages = pages.into_iter().filter(|p| seen.insert(*p)).collect();
        Self {
            pages: Mutex::new(pages),
        }
    }

    /// Creates a queue holding pages `1..=page_count`.
    pub fn for_page_count(page_count: u32) -> Self {
        Self::new(1..=page_count)
    }

    /// Removes and returns the next page number.
    ///
    /// The emptiness check and the removal happen under one lock, so two
    /// workers can never receive the same page.
    pub async fn pop(&self) -> Option<PageNumber> {
        self.pages.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.pages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pages.lock().await.is_empty()
    }
}

/// Result of appending one page worth of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub appended: usize,
    pub duplicates: usize,
}

#[derive(Debug, Default)]
struct AccumulatorState {
    records: Vec<ValidatedJobRecord>,
    seen_links: HashSet<String>,
}

/// Append-only collection of validated records shared by all workers.
///
/// Appends are serialized by a mutex. The record count is mirrored in an
/// atomic so workers can check the cap without taking the lock.
#[derive(Debug)]
pub struct ResultsAccumulator {
    state: Mutex<AccumulatorState>,
    count: AtomicUsize,
    dedupe: bool,
}

impl ResultsAccumulator {
    /// Creates an empty accumulator. With `dedupe` set, a record whose link
    /// was already appended is skipped.
    pub fn new(dedupe: bool) -> Self {
        Self {
            state: Mutex::new(AccumulatorState::default()),
            count: AtomicUsize::new(0),
            dedupe,
        }
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends records in order, returning how many were kept.
    pub async fn append(&self, records: Vec<ValidatedJobRecord>) -> AppendOutcome {
        let mut outcome = AppendOutcome::default();
        if records.is_empty() {
            return outcome;
        }

        let mut state = self.state.lock().await;
        for record in records {
            if self.dedupe && !state.seen_links.insert(record.link().to_string()) {
                outcome.duplicates += 1;
                continue;
            }
            state.records.push(record);
            outcome.appended += 1;
        }
        self.count.store(state.records.len(), Ordering::Release);

        outcome
    }

    /// Takes every accumulated record, leaving the accumulator empty.
    pub async fn take(&self) -> Vec<ValidatedJobRecord> {
        let mut state = self.state.lock().await;
        state.seen_links.clear();
        self.count.store(0, Ordering::Release);
        std::mem::take(&mut state.records)
    }
}

/// Statistics about one pool run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    /// Number of workers spawned.
    pub num_workers: usize,
    /// Pages fetched and parsed successfully.
    pub pages_fetched: u64,
    /// Pages whose fetch failed.
    pub pages_failed: u64,
    /// Records that passed validation and were appended.
    pub records_accepted: u64,
    /// Records dropped as incomplete.
    pub records_rejected: u64,
    /// Records dropped because their link was already collected.
    pub records_duplicate: u64,
    /// Average page fetch duration.
    pub average_fetch_duration: Duration,
    /// Whether the crawl deadline elapsed before the pool drained.
    pub timed_out: bool,
}

impl PoolStats {
    /// Returns the total number of pages processed (fetched + failed).
    pub fn total_pages(&self) -> u64 {
        self.pages_fetched + self.pages_failed
    }

    /// Returns the page success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_pages();
        if total == 0 {
            return 0.0;
        }
        (self.pages_fetched as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    pages_fetched: AtomicU64,
    pages_failed: AtomicU64,
    records_accepted: AtomicU64,
    records_rejected: AtomicU64,
    records_duplicate: AtomicU64,
    total_fetch_ms: AtomicU64,
    active_workers: AtomicUsize,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            pages_fetched: AtomicU64::new(0),
            pages_failed: AtomicU64::new(0),
            records_accepted: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            records_duplicate: AtomicU64::new(0),
            total_fetch_ms: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
        }
    }

    fn record_page_fetched(
        &self,
        duration: Duration,
        accepted: usize,
        rejected: usize,
        duplicates: usize,
    ) {
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);
        self.records_accepted
            .fetch_add(accepted as u64, Ordering::SeqCst);
        self.records_rejected
            .fetch_add(rejected as u64, Ordering::SeqCst);
        self.records_duplicate
            .fetch_add(duplicates as u64, Ordering::SeqCst);
        self.total_fetch_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_page_failed(&self, duration: Duration) {
        self.pages_failed.fetch_add(1, Ordering::SeqCst);
        self.total_fetch_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    fn to_pool_stats(&self, num_workers: usize, timed_out: bool) -> PoolStats {
        let fetched = self.pages_fetched.load(Ordering::SeqCst);
        let failed = self.pages_failed.load(Ordering::SeqCst);
        let total_fetch_ms = self.total_fetch_ms.load(Ordering::SeqCst);

        let total_pages = fetched + failed;
        let average_fetch_duration = if total_pages > 0 {
            Duration::from_millis(total_fetch_ms / total_pages)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            pages_fetched: fetched,
            pages_failed: failed,
            records_accepted: self.records_accepted.load(Ordering::SeqCst),
            records_rejected: self.records_rejected.load(Ordering::SeqCst),
            records_duplicate: self.records_duplicate.load(Ordering::SeqCst),
            average_fetch_duration,
            timed_out,
        }
    }
}

/// Records collected by a finished pool, in completion order.
#[derive(Debug)]
pub struct PoolOutcome {
    pub records: Vec<ValidatedJobRecord>,
    pub stats: PoolStats,
}

/// Pool of workers crawling `1..=page_count` through one fetch session.
pub struct WorkerPool {
    config: CrawlConfig,
    session: Arc<dyn FetchSession>,
    metrics: MetricsCollector,
}

impl WorkerPool {
    /// Creates a pool for one crawl.
    ///
    /// # Arguments
    ///
    /// * `config` - Crawl configuration (pages, workers, cap, deadline)
    /// * `session` - Fetch session shared by every worker
    pub fn new(config: CrawlConfig, session: Arc<dyn FetchSession>) -> Self {
        Self {
            config,
            session,
            metrics: MetricsCollector::new(),
        }
    }

    /// Runs the workers to completion and returns everything they
    /// collected.
    ///
    /// The returned records may exceed `result_cap` by whatever the pages in
    /// flight at cap time contributed.
    pub async fn run(self) -> PoolOutcome {
        let queue = Arc::new(WorkQueue::for_page_count(self.config.page_count));
        let results = Arc::new(ResultsAccumulator::new(self.config.dedupe));
        let stats = Arc::new(SharedPoolStats::new());
        let num_workers = self.config.effective_workers();

        // Buffer size of 1 is sufficient since we only send once
        let (shutdown_tx, _) = broadcast::channel(1);

        self.metrics.set_queue_depth(self.config.page_count as usize);

        let mut handles = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let worker = Worker {
                id: format!("worker-{}", i),
                queue: Arc::clone(&queue),
                results: Arc::clone(&results),
                session: Arc::clone(&self.session),
                shutdown_rx: shutdown_tx.subscribe(),
                result_cap: self.config.result_cap,
                stats: Arc::clone(&stats),
                metrics: self.metrics,
            };

            handles.push(tokio::spawn(worker.run().in_current_span()));
        }

        info!(
            num_workers,
            pages = self.config.page_count,
            result_cap = self.config.result_cap,
            "Crawl workers started"
        );

        let mut all_workers = Box::pin(join_all(handles));
        let mut timed_out = false;

        let joined = match self.config.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, &mut all_workers).await {
                Ok(joined) => joined,
                Err(_) => {
                    timed_out = true;
                    warn!(
                        deadline_secs = deadline.as_secs_f64(),
                        collected = results.len(),
                        "Crawl deadline elapsed, cancelling in-flight pages"
                    );
                    // Ignore send error - every worker may have already stopped
                    let _ = shutdown_tx.send(());
                    all_workers.await
                }
            },
            None => all_workers.await,
        };

        for joined_worker in joined {
            if let Err(e) = joined_worker {
                error!(error = %e, "Crawl worker panicked");
            }
        }

        let records = results.take().await;
        let stats = stats.to_pool_stats(num_workers, timed_out);

        info!(
            collected = records.len(),
            pages_fetched = stats.pages_fetched,
            pages_failed = stats.pages_failed,
            timed_out,
            "Crawl workers finished"
        );

        PoolOutcome { records, stats }
    }
}

/// A single worker pulling page numbers from the shared queue.
struct Worker {
    /// Identifier used in logs.
    id: String,
    queue: Arc<WorkQueue>,
    results: Arc<ResultsAccumulator>,
    session: Arc<dyn FetchSession>,
    /// Receiver for the deadline shutdown signal.
    shutdown_rx: broadcast::Receiver<()>,
    result_cap: usize,
    stats: Arc<SharedPoolStats>,
    metrics: MetricsCollector,
}

/// Marks a worker active for as long as it is alive.
///
/// Dropped on every exit from `Worker::run`, including a panic inside a
/// fetch, so the active-worker gauge is always released.
struct ActiveWorkerGuard {
    metrics: MetricsCollector,
    stats: Arc<SharedPoolStats>,
}

impl ActiveWorkerGuard {
    fn new(metrics: MetricsCollector, stats: Arc<SharedPoolStats>) -> Self {
        metrics.worker_started();
        stats.active_workers.fetch_add(1, Ordering::SeqCst);
        Self { metrics, stats }
    }
}

impl Drop for ActiveWorkerGuard {
    fn drop(&mut self) {
        self.stats.active_workers.fetch_sub(1, Ordering::SeqCst);
        self.metrics.worker_stopped();
    }
}

impl Worker {
    /// Main worker loop.
    async fn run(mut self) {
        debug!(worker_id = %self.id, "Worker started");
        let _active = ActiveWorkerGuard::new(self.metrics, Arc::clone(&self.stats));

        loop {
            if self.results.len() >= self.result_cap {
                debug!(worker_id = %self.id, "Result cap reached");
                break;
            }

            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => break,
                Err(broadcast::error::TryRecvError::Lagged(_)) => break,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            let Some(page) = self.queue.pop().await else {
                debug!(worker_id = %self.id, "Work queue drained");
                break;
            };
            self.metrics.set_queue_depth(self.queue.len().await);

            let start_time = Instant::now();
            let fetched = tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!(worker_id = %self.id, page, "Abandoning page on shutdown");
                    break;
                }
                fetched = self.session.fetch_page(page) => fetched,
            };

            self.process_page(page, fetched, start_time.elapsed()).await;
        }

        debug!(worker_id = %self.id, "Worker stopped");
    }

    /// Filters and appends one page's records, or records its failure.
    async fn process_page(
        &self,
        page: PageNumber,
        fetched: Result<Vec<RawJobRecord>, FetchError>,
        duration: Duration,
    ) {
        match fetched {
            Ok(raw) => {
                let found = raw.len();
                let (valid, rejected) = filter_records(raw);
                let outcome = self.results.append(valid).await;

                self.stats.record_page_fetched(
                    duration,
                    outcome.appended,
                    rejected,
                    outcome.duplicates,
                );
                self.metrics
                    .record_page(PageOutcome::Fetched, duration.as_secs_f64());
                self.metrics
                    .record_records(RecordOutcome::Accepted, outcome.appended);
                self.metrics.record_records(RecordOutcome::Rejected, rejected);
                self.metrics
                    .record_records(RecordOutcome::Duplicate, outcome.duplicates);

                debug!(
                    worker_id = %self.id,
                    page,
                    found,
                    accepted = outcome.appended,
                    rejected,
                    duplicates = outcome.duplicates,
                    collected = self.results.len(),
                    duration_ms = duration.as_millis() as u64,
                    "Page processed"
                );
            }
            Err(e) => {
                self.stats.record_page_failed(duration);
                self.metrics
                    .record_page(PageOutcome::Failed, duration.as_secs_f64());

                warn!(
                    worker_id = %self.id,
                    page,
                    error = %e,
                    "Page fetch failed, skipping"
                );
            }
        }
    }
}

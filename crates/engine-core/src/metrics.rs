use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    pages_fetched: AtomicU64,
    rows_read: AtomicU64,
    rows_written: AtomicU64,
    batches_written: AtomicU64,
    unprocessed_retries: AtomicU64,
    failure_count: AtomicU64,
}

/// Shared counters for one operation. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pages_fetched: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    pub batches_written: u64,
    pub unprocessed_retries: u64,
    pub failure_count: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn record_page(&self, rows: usize) {
        self.inner.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.inner
            .rows_read
            .fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn increment_written(&self, count: u64) {
        self.inner.rows_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batches(&self, count: u64) {
        self.inner
            .batches_written
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner
            .unprocessed_retries
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_failures(&self, count: u64) {
        self.inner.failure_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Adds the counters of a finished run to these.
    pub fn absorb(&self, run: &MetricsSnapshot) {
        let inner = &self.inner;
        inner.pages_fetched.fetch_add(run.pages_fetched, Ordering::Relaxed);
        inner.rows_read.fetch_add(run.rows_read, Ordering::Relaxed);
        inner.rows_written.fetch_add(run.rows_written, Ordering::Relaxed);
        inner
            .batches_written
            .fetch_add(run.batches_written, Ordering::Relaxed);
        inner
            .unprocessed_retries
            .fetch_add(run.unprocessed_retries, Ordering::Relaxed);
        inner.failure_count.fetch_add(run.failure_count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_fetched: self.inner.pages_fetched.load(Ordering::Relaxed),
            rows_read: self.inner.rows_read.load(Ordering::Relaxed),
            rows_written: self.inner.rows_written.load(Ordering::Relaxed),
            batches_written: self.inner.batches_written.load(Ordering::Relaxed),
            unprocessed_retries: self.inner.unprocessed_retries.load(Ordering::Relaxed),
            failure_count: self.inner.failure_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

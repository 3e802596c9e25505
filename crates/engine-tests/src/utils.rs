use async_trait::async_trait;
use engine_core::{
    connectors::{
        destination::ItemWriter,
        memory::{InMemoryStore, KeySchema},
        source::PageSource,
    },
    error::StoreError,
};
use model::{
    pagination::{
        descriptor::{QueryDescriptor, ScanDescriptor},
        page::Page,
    },
    records::{
        batch::{BatchGetOutput, BatchGetRequest, BatchWriteOutput},
        row::Row,
        write::WriteRequest,
    },
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// An in-memory store with one `PK`/`SK` table holding `rows` items.
/// `PK` cycles through three tenants, `SK` is the item number.
pub async fn seeded_store(table: &str, rows: i64, page_size: usize) -> Arc<InMemoryStore> {
    let store = InMemoryStore::new().with_page_size(page_size);
    store
        .create_table(table, KeySchema::composite("PK", "SK"))
        .await;
    for i in 0..rows {
        store
            .put_item(table, item(i))
            .await
            .expect("seed item");
    }
    Arc::new(store)
}

pub fn item(i: i64) -> Row {
    Row::new()
        .with("PK", format!("tenant#{}", i % 3))
        .with("SK", i)
        .with("payload", format!("item {i}"))
}

/// Records the size of every batch write before forwarding it.
pub struct RecordingWriter {
    pub inner: Arc<InMemoryStore>,
    pub batches: Mutex<Vec<Vec<WriteRequest>>>,
}

impl RecordingWriter {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches
            .lock()
            .expect("batches lock")
            .iter()
            .map(Vec::len)
            .collect()
    }
}

#[async_trait]
impl PageSource for RecordingWriter {
    async fn scan(&self, request: &ScanDescriptor) -> Result<Page, StoreError> {
        self.inner.scan(request).await
    }

    async fn query(&self, request: &QueryDescriptor) -> Result<Page, StoreError> {
        self.inner.query(request).await
    }

    async fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetOutput, StoreError> {
        self.inner.batch_get(request).await
    }
}

#[async_trait]
impl ItemWriter for RecordingWriter {
    async fn batch_write(
        &self,
        table: &str,
        requests: &[WriteRequest],
    ) -> Result<BatchWriteOutput, StoreError> {
        self.batches
            .lock()
            .expect("batches lock")
            .push(requests.to_vec());
        self.inner.batch_write(table, requests).await
    }

    async fn put_item(&self, table: &str, row: Row) -> Result<(), StoreError> {
        self.inner.put_item(table, row).await
    }
}

/// Leaves the first `hold_back` requests of the first batch write
/// unprocessed, then behaves normally.
pub struct UnprocessedOnce {
    pub inner: Arc<InMemoryStore>,
    pub hold_back: usize,
    pub calls: AtomicUsize,
}

impl UnprocessedOnce {
    pub fn new(inner: Arc<InMemoryStore>, hold_back: usize) -> Self {
        Self {
            inner,
            hold_back,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ItemWriter for UnprocessedOnce {
    async fn batch_write(
        &self,
        table: &str,
        requests: &[WriteRequest],
    ) -> Result<BatchWriteOutput, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call > 0 || self.hold_back == 0 {
            return self.inner.batch_write(table, requests).await;
        }

        let split = self.hold_back.min(requests.len());
        let (held, applied) = requests.split_at(split);
        if !applied.is_empty() {
            self.inner.batch_write(table, applied).await?;
        }

        let mut output = BatchWriteOutput::default();
        output.unprocessed.insert(table.to_string(), held.to_vec());
        Ok(output)
    }

    async fn put_item(&self, table: &str, row: Row) -> Result<(), StoreError> {
        self.inner.put_item(table, row).await
    }
}

/// Fails every scan request for one segment and counts the scan calls
/// issued after that failure.
pub struct FailingSegment {
    pub inner: Arc<InMemoryStore>,
    pub segment: u32,
    pub delay: Duration,
    pub failed: AtomicBool,
    pub calls: AtomicUsize,
    pub calls_after_failure: AtomicUsize,
}

impl FailingSegment {
    pub fn new(inner: Arc<InMemoryStore>, segment: u32, delay: Duration) -> Self {
        Self {
            inner,
            segment,
            delay,
            failed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            calls_after_failure: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PageSource for FailingSegment {
    async fn scan(&self, request: &ScanDescriptor) -> Result<Page, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failed.load(Ordering::SeqCst) {
            self.calls_after_failure.fetch_add(1, Ordering::SeqCst);
        }

        tokio::time::sleep(self.delay).await;

        if request.segment.map(|s| s.index) == Some(self.segment) {
            self.failed.store(true, Ordering::SeqCst);
            return Err(StoreError::Transport(format!(
                "segment {} unreachable",
                self.segment
            )));
        }
        self.inner.scan(request).await
    }

    async fn query(&self, request: &QueryDescriptor) -> Result<Page, StoreError> {
        self.inner.query(request).await
    }

    async fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetOutput, StoreError> {
        self.inner.batch_get(request).await
    }
}

/// Serves a fixed sequence of pages regardless of the request, following
/// the start key as an index into the sequence.
pub struct ScriptedPages {
    pub pages: Vec<Vec<Row>>,
    pub requests: AtomicUsize,
}

impl ScriptedPages {
    /// `pages` pages of `per_page` rows keyed `PK = "p"`, `SK = 0..`.
    pub fn new(pages: usize, per_page: usize) -> Self {
        let pages = (0..pages)
            .map(|p| {
                (0..per_page)
                    .map(|i| {
                        Row::new()
                            .with("PK", "p")
                            .with("SK", (p * per_page + i) as i64)
                            .with("data", "x")
                    })
                    .collect()
            })
            .collect();
        Self {
            pages,
            requests: AtomicUsize::new(0),
        }
    }

    fn page_at(&self, start: Option<&Row>) -> Page {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let index = match start.and_then(|key| key.get("page")).and_then(|v| v.as_i64()) {
            Some(i) => i as usize,
            None => 0,
        };
        let rows = self.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.pages.len()).then(|| {
            model::pagination::cursor::ContinuationToken::new(
                Row::new().with("page", (index + 1) as i64),
            )
        });
        Page::new(rows, next)
    }
}

#[async_trait]
impl PageSource for ScriptedPages {
    async fn scan(&self, request: &ScanDescriptor) -> Result<Page, StoreError> {
        Ok(self.page_at(request.start_key.as_ref().map(|t| t.key())))
    }

    async fn query(&self, request: &QueryDescriptor) -> Result<Page, StoreError> {
        Ok(self.page_at(request.start_key.as_ref().map(|t| t.key())))
    }

    async fn batch_get(&self, _request: &BatchGetRequest) -> Result<BatchGetOutput, StoreError> {
        Ok(BatchGetOutput::default())
    }
}

/// Tracks how many callers are inside a section at once.
#[derive(Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard { probe: self }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct ProbeGuard<'a> {
    probe: &'a ConcurrencyProbe,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Delays every single-item put, for exercising cancellation of a copy.
pub struct SlowWriter {
    pub inner: Arc<InMemoryStore>,
    pub delay: Duration,
}

#[async_trait]
impl ItemWriter for SlowWriter {
    async fn batch_write(
        &self,
        table: &str,
        requests: &[WriteRequest],
    ) -> Result<BatchWriteOutput, StoreError> {
        self.inner.batch_write(table, requests).await
    }

    async fn put_item(&self, table: &str, row: Row) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.put_item(table, row).await
    }
}

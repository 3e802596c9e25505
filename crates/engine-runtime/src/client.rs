use crate::error::RuntimeError;
use engine_config::settings::{RawSettings, validated::ValidatedSettings};
use engine_core::{
    connectors::{
        destination::{ItemWriter, TableStore},
        source::PageSource,
    },
    metrics::Metrics,
};
use engine_processing::{
    batch::{get::BatchGetter, writer::BatchWriter},
    copy::{pipeline::CopyJob, policy::ErrorPolicy, report::CopyReport},
    delete::sweeper::DeletionSweeper,
    error::{BoxError, ProcessingError},
    iter::{limited::LimitedPager, pager::Pager},
    scan::{count::scan_count, parallel::ParallelScan},
};
use model::{
    pagination::{
        descriptor::{QueryDescriptor, ScanDescriptor},
        page::Page,
    },
    records::{
        batch::BatchGetRequest, key::KeyExtractor, row::Row, write::WriteRequest,
    },
};
use std::{future::Future, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, info_span};
use uuid::Uuid;

/// Entry point for every bulk operation against one store.
///
/// Each call takes a cancellation token; cancelling it stops the operation
/// and yields [`ProcessingError::Cancelled`]. Every call runs inside its own
/// span tagged with a fresh operation id.
pub struct Client<S: TableStore + 'static> {
    store: Arc<S>,
    settings: ValidatedSettings,
    metrics: Metrics,
}

impl<S: TableStore + 'static> Client<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_settings(store, ValidatedSettings::default())
    }

    pub fn with_settings(store: Arc<S>, settings: ValidatedSettings) -> Self {
        Self {
            store,
            settings,
            metrics: Metrics::new(),
        }
    }

    pub fn from_settings_file(store: Arc<S>, path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let settings = RawSettings::from_file(path)?.validate()?;
        Ok(Self::with_settings(store, settings))
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &ValidatedSettings {
        &self.settings
    }

    /// Counters accumulated across all operations of this client.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn source(&self) -> Arc<dyn PageSource> {
        self.store.clone()
    }

    fn writer(&self) -> Arc<dyn ItemWriter> {
        self.store.clone()
    }

    fn batch_writer(&self) -> BatchWriter {
        BatchWriter::from_settings(self.writer(), &self.settings).with_metrics(self.metrics.clone())
    }

    fn span(operation: &'static str, table: &str) -> Span {
        info_span!("operation", op = operation, op_id = %Uuid::new_v4(), table)
    }

    /// Writes any number of puts and deletes in batches of at most 25.
    /// Returns how many were applied.
    pub async fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        self.batch_writer()
            .write(table, requests, cancel)
            .instrument(Self::span("batch_write", table))
            .await
    }

    pub async fn batch_put(
        &self,
        table: &str,
        rows: Vec<Row>,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        self.batch_writer()
            .put_all(table, rows, cancel)
            .instrument(Self::span("batch_put", table))
            .await
    }

    /// Fetches items by key and hands each to `callback`.
    pub async fn batch_get<F>(
        &self,
        request: BatchGetRequest,
        callback: F,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError>
    where
        F: FnMut(Row) -> Result<(), BoxError> + Send,
    {
        let span = Self::span("batch_get", &request.table);
        BatchGetter::new(self.source())
            .with_retry(self.settings.retry_policy().clone())
            .with_metrics(self.metrics.clone())
            .get_all(request, callback, cancel)
            .instrument(span)
            .await
    }

    /// Scans with `segments` concurrent workers. With `serialize_callback`
    /// the callback never runs concurrently with itself.
    pub async fn parallel_scan<F, Fut>(
        &self,
        descriptor: ScanDescriptor,
        segments: usize,
        callback: F,
        serialize_callback: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError>
    where
        F: Fn(Page) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProcessingError>> + Send + 'static,
    {
        let span = Self::span("parallel_scan", &descriptor.table);
        ParallelScan::new(self.source(), segments)
            .serialize_callback(serialize_callback)
            .with_metrics(self.metrics.clone())
            .run(descriptor, callback, cancel)
            .instrument(span)
            .await
    }

    /// Same as [`Self::parallel_scan`] with the configured segment count and
    /// callback serialization.
    pub async fn parallel_scan_default<F, Fut>(
        &self,
        descriptor: ScanDescriptor,
        callback: F,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError>
    where
        F: Fn(Page) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProcessingError>> + Send + 'static,
    {
        self.parallel_scan(
            descriptor,
            self.settings.segments(),
            callback,
            self.settings.serialize_callback(),
            cancel,
        )
        .await
    }

    /// Copies `source` into `destination` within this store.
    pub async fn copy_table(
        &self,
        destination: &str,
        source: &str,
        workers: usize,
        policy: ErrorPolicy,
        cancel: &CancellationToken,
    ) -> Result<CopyReport, ProcessingError> {
        self.copy_table_to(self.store.clone(), destination, source, workers, policy, cancel)
            .await
    }

    /// Copies `source` from this store into `destination` on another writer.
    pub async fn copy_table_to<D: ItemWriter + 'static>(
        &self,
        target: Arc<D>,
        destination: &str,
        source: &str,
        workers: usize,
        policy: ErrorPolicy,
        cancel: &CancellationToken,
    ) -> Result<CopyReport, ProcessingError> {
        let span = info_span!(
            "operation",
            op = "copy_table",
            op_id = %Uuid::new_v4(),
            source,
            destination
        );
        let capacity = if workers == self.settings.workers() {
            self.settings.channel_capacity()
        } else {
            workers
        };

        let job = CopyJob::new(self.source(), source, target, destination)
            .with_workers(workers)
            .with_channel_capacity(capacity)
            .with_policy(policy)
            .with_metrics(self.metrics.clone());
        job.run(cancel).instrument(span).await
    }

    /// Deletes every item the query matches.
    pub async fn query_delete(
        &self,
        table: &str,
        request: QueryDescriptor,
        keys: &dyn KeyExtractor,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        self.sweeper()
            .query_delete(table, request, keys, cancel)
            .instrument(Self::span("query_delete", table))
            .await
    }

    /// Deletes every item the scan matches.
    pub async fn scan_delete(
        &self,
        table: &str,
        request: ScanDescriptor,
        keys: &dyn KeyExtractor,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        self.sweeper()
            .scan_delete(table, request, keys, cancel)
            .instrument(Self::span("scan_delete", table))
            .await
    }

    fn sweeper(&self) -> DeletionSweeper {
        DeletionSweeper::new(self.source(), self.batch_writer())
            .with_page_size(self.settings.page_size())
    }

    /// Runs `callback` per page of a query. The request's limit caps the
    /// total rows; a trimmed last page resumes from `cursor_fields`.
    pub async fn query_iter<F>(
        &self,
        request: QueryDescriptor,
        cursor_fields: &[&str],
        callback: F,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError>
    where
        F: FnMut(Page) -> Result<(), BoxError> + Send,
    {
        let span = Self::span("query_iter", &request.table);
        LimitedPager::new(
            self.source(),
            request,
            self.settings.page_size(),
            owned(cursor_fields),
            cancel,
        )?
        .with_metrics(self.metrics.clone())
        .for_each(callback)
        .instrument(span)
        .await
    }

    /// Scan counterpart of [`Self::query_iter`].
    pub async fn scan_iter<F>(
        &self,
        request: ScanDescriptor,
        cursor_fields: &[&str],
        callback: F,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError>
    where
        F: FnMut(Page) -> Result<(), BoxError> + Send,
    {
        let span = Self::span("scan_iter", &request.table);
        LimitedPager::new(
            self.source(),
            request,
            self.settings.page_size(),
            owned(cursor_fields),
            cancel,
        )?
        .with_metrics(self.metrics.clone())
        .for_each(callback)
        .instrument(span)
        .await
    }

    /// Pull-based paging over a query.
    pub fn query_pager(
        &self,
        request: QueryDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Pager<QueryDescriptor>, ProcessingError> {
        Ok(Pager::new(self.source(), request, cancel)?.with_metrics(self.metrics.clone()))
    }

    /// Pull-based paging over a scan.
    pub fn scan_pager(
        &self,
        request: ScanDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Pager<ScanDescriptor>, ProcessingError> {
        Ok(Pager::new(self.source(), request, cancel)?.with_metrics(self.metrics.clone()))
    }

    /// Number of items the scan matches.
    pub async fn scan_count(
        &self,
        descriptor: ScanDescriptor,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        let span = Self::span("scan_count", &descriptor.table);
        scan_count(self.source(), descriptor, self.metrics.clone(), cancel)
            .instrument(span)
            .await
    }
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::connectors::memory::{InMemoryStore, KeySchema};
    use futures::StreamExt;
    use model::records::key::FieldsExtractor;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    async fn client() -> Client<InMemoryStore> {
        let store = InMemoryStore::new().with_page_size(10);
        store.create_table("users", KeySchema::composite("PK", "SK")).await;
        store.create_table("archive", KeySchema::composite("PK", "SK")).await;
        Client::new(Arc::new(store))
    }

    fn users(n: i64) -> Vec<Row> {
        (0..n)
            .map(|i| {
                Row::new()
                    .with("PK", format!("tenant#{}", i % 3))
                    .with("SK", i)
                    .with("name", format!("user {i}"))
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn put_copy_count_and_delete() {
        let client = client().await;
        let token = CancellationToken::new();

        assert_eq!(client.batch_put("users", users(40), &token).await.unwrap(), 40);

        let report = client
            .copy_table("archive", "users", 3, ErrorPolicy::Abort, &token)
            .await
            .unwrap();
        assert_eq!(report.rows_written, 40);

        let pages_before = client.metrics().snapshot().pages_fetched;
        let count = client
            .scan_count(ScanDescriptor::new("archive"), &token)
            .await
            .unwrap();
        assert_eq!(count, 40);
        assert!(client.metrics().snapshot().pages_fetched > pages_before);

        let deleted = client
            .scan_delete(
                "archive",
                ScanDescriptor::new("archive"),
                &FieldsExtractor::pk_sk(),
                &token,
            )
            .await
            .unwrap();
        assert_eq!(deleted, 40);
        assert_eq!(client.store().item_count("archive").await.unwrap(), 0);
        // 40 puts, 40 copied rows and 40 deletes.
        assert_eq!(client.metrics().snapshot().rows_written, 120);
    }

    #[tokio::test]
    async fn scan_pager_streams_pages() {
        let client = client().await;
        let token = CancellationToken::new();
        client.batch_put("users", users(25), &token).await.unwrap();

        let pages: Vec<Page> = client
            .scan_pager(ScanDescriptor::new("users"), &token)
            .unwrap()
            .into_stream()
            .map(|page| page.unwrap())
            .collect()
            .await;
        assert_eq!(pages.iter().map(Page::len).sum::<usize>(), 25);
    }

    #[tokio::test]
    async fn batch_get_returns_requested_items() {
        let client = client().await;
        let token = CancellationToken::new();
        client.batch_put("users", users(6), &token).await.unwrap();

        let keys = users(6)
            .iter()
            .step_by(2)
            .map(|row| FieldsExtractor::pk_sk().extract(row))
            .collect();
        let mut names = Vec::new();
        client
            .batch_get(
                BatchGetRequest::new("users", keys).with_projection(["name"]),
                |row| {
                    names.push(row.get("name").and_then(|v| v.as_str().map(String::from)));
                    Ok(())
                },
                &token,
            )
            .await
            .unwrap();

        names.sort();
        assert_eq!(
            names,
            vec![
                Some("user 0".to_string()),
                Some("user 2".to_string()),
                Some("user 4".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn settings_file_configures_client() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"batch": {{"max_batch_size": 10}}, "copy": {{"workers": 2}}}}"#).unwrap();

        let store = Arc::new(InMemoryStore::new());
        let client = Client::from_settings_file(store, file.path()).unwrap();

        assert_eq!(client.settings().max_batch_size(), 10);
        assert_eq!(client.settings().workers(), 2);
    }
}

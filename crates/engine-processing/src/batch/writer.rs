use crate::error::ProcessingError;
use engine_config::settings::validated::ValidatedSettings;
use engine_core::{connectors::destination::ItemWriter, metrics::Metrics, retry::RetryPolicy};
use model::records::{batch::MAX_BATCH_WRITE, row::Row, write::WriteRequest};
use std::{collections::BTreeMap, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Splits requests into groups of at most `size`, keeping their order.
pub fn chunk_write_requests(requests: Vec<WriteRequest>, size: usize) -> Vec<Vec<WriteRequest>> {
    let size = size.clamp(1, MAX_BATCH_WRITE);
    let mut chunks = Vec::with_capacity(requests.len().div_ceil(size));
    let mut iter = requests.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

/// Writes any number of requests in store-sized batches, resubmitting
/// unprocessed items with backoff until they are applied or the retry
/// budget runs out.
#[derive(Clone)]
pub struct BatchWriter {
    writer: Arc<dyn ItemWriter>,
    max_batch_size: usize,
    retry: RetryPolicy,
    metrics: Metrics,
}

impl BatchWriter {
    pub fn new(writer: Arc<dyn ItemWriter>) -> Self {
        Self {
            writer,
            max_batch_size: MAX_BATCH_WRITE,
            retry: RetryPolicy::default(),
            metrics: Metrics::new(),
        }
    }

    pub fn from_settings(writer: Arc<dyn ItemWriter>, settings: &ValidatedSettings) -> Self {
        Self::new(writer)
            .with_batch_size(settings.max_batch_size())
            .with_retry(settings.retry_policy().clone())
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.clamp(1, MAX_BATCH_WRITE);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Writes every request and returns how many were applied.
    ///
    /// On failure the error is a [`ProcessingError::PartialWrite`] carrying the
    /// number applied before it.
    pub async fn write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        let total = requests.len();
        let mut written = 0usize;

        for (chunk_no, chunk) in chunk_write_requests(requests, self.max_batch_size)
            .into_iter()
            .enumerate()
        {
            if cancel.is_cancelled() {
                return Err(ProcessingError::Cancelled.partial(written));
            }

            debug!(table, chunk = chunk_no, size = chunk.len(), "Writing batch");
            self.write_chunk(table, chunk, cancel, &mut written)
                .await
                .map_err(|e| e.partial(written))?;
        }

        debug!(table, total, written, "Batch write finished");
        Ok(written)
    }

    /// Converts rows into put requests and writes them.
    pub async fn put_all(
        &self,
        table: &str,
        rows: Vec<Row>,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        let requests = rows.into_iter().map(WriteRequest::put).collect();
        self.write(table, requests, cancel).await
    }

    async fn write_chunk(
        &self,
        table: &str,
        chunk: Vec<WriteRequest>,
        cancel: &CancellationToken,
        written: &mut usize,
    ) -> Result<(), ProcessingError> {
        // The store may hand back unprocessed items addressed to other tables.
        let mut pending = BTreeMap::from([(table.to_string(), chunk)]);
        let mut round = 0usize;

        loop {
            round += 1;
            let mut leftover: BTreeMap<String, Vec<WriteRequest>> = BTreeMap::new();

            for (target, requests) in pending {
                let output = self
                    .writer
                    .batch_write(&target, &requests)
                    .await
                    .map_err(|e| ProcessingError::store(&target, e))?;

                let unprocessed = output.unprocessed_count();
                let applied = requests.len().saturating_sub(unprocessed);
                *written += applied;
                self.metrics.increment_batches(1);
                self.metrics.increment_written(applied as u64);

                for (t, items) in output.unprocessed {
                    if !items.is_empty() {
                        leftover.entry(t).or_default().extend(items);
                    }
                }
            }

            if leftover.is_empty() {
                return Ok(());
            }

            let remaining: usize = leftover.values().map(Vec::len).sum();
            if !self.retry.allows(round) {
                return Err(ProcessingError::UnprocessedRetriesExhausted {
                    table: table.to_string(),
                    remaining,
                });
            }

            let delay = self.retry.backoff_delay(round);
            warn!(
                table,
                round,
                remaining,
                delay_ms = delay.as_millis() as u64,
                "Store left items unprocessed, resubmitting"
            );
            self.metrics.increment_retries(remaining as u64);

            tokio::select! {
                _ = cancel.cancelled() => return Err(ProcessingError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            pending = leftover;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_core::error::StoreError;
    use model::records::batch::BatchWriteOutput;
    use std::sync::Mutex;

    fn puts(n: usize) -> Vec<WriteRequest> {
        (0..n)
            .map(|i| WriteRequest::put(Row::new().with("PK", i as i64)))
            .collect()
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<usize>>,
        leave_unprocessed: Mutex<usize>,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl ItemWriter for Recorder {
        async fn batch_write(
            &self,
            table: &str,
            requests: &[WriteRequest],
        ) -> Result<BatchWriteOutput, StoreError> {
            let call_no = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(requests.len());
                calls.len()
            };
            if self.fail_on_call == Some(call_no) {
                return Err(StoreError::Throttled("slow down".to_string()));
            }

            let mut output = BatchWriteOutput::default();
            let mut leave = self.leave_unprocessed.lock().unwrap();
            if *leave > 0 {
                let k = (*leave).min(requests.len());
                output
                    .unprocessed
                    .insert(table.to_string(), requests[..k].to_vec());
                *leave = 0;
            }
            Ok(output)
        }

        async fn put_item(&self, _table: &str, _row: Row) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn chunks_preserve_order() {
        let chunks = chunk_write_requests(puts(57), 25);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![25, 25, 7]);
        let flattened: Vec<WriteRequest> = chunks.into_iter().flatten().collect();
        assert_eq!(flattened, puts(57));
    }

    #[test]
    fn chunk_size_is_capped_at_store_maximum() {
        let chunks = chunk_write_requests(puts(30), 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunk_write_requests(Vec::new(), 25).is_empty());
    }

    #[tokio::test]
    async fn resubmits_unprocessed_items() {
        let store = Arc::new(Recorder {
            leave_unprocessed: Mutex::new(4),
            ..Default::default()
        });
        let writer = BatchWriter::new(store.clone()).with_retry(RetryPolicy::immediate(3));

        let written = writer
            .write("t", puts(10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written, 10);
        assert_eq!(*store.calls.lock().unwrap(), vec![10, 4]);
        assert_eq!(writer.metrics().snapshot().unprocessed_retries, 4);
    }

    #[tokio::test]
    async fn resubmits_items_addressed_to_another_table() {
        /// Hands back the first three items of the first call under `other`.
        #[derive(Default)]
        struct Redirect {
            calls: Mutex<Vec<(String, usize)>>,
        }

        #[async_trait]
        impl ItemWriter for Redirect {
            async fn batch_write(
                &self,
                table: &str,
                requests: &[WriteRequest],
            ) -> Result<BatchWriteOutput, StoreError> {
                let first = {
                    let mut calls = self.calls.lock().unwrap();
                    calls.push((table.to_string(), requests.len()));
                    calls.len() == 1
                };
                let mut output = BatchWriteOutput::default();
                if first {
                    output
                        .unprocessed
                        .insert("other".to_string(), requests[..3].to_vec());
                }
                Ok(output)
            }

            async fn put_item(&self, _table: &str, _row: Row) -> Result<(), StoreError> {
                Ok(())
            }
        }

        let store = Arc::new(Redirect::default());
        let writer = BatchWriter::new(store.clone()).with_retry(RetryPolicy::immediate(3));

        let written = writer
            .write("t", puts(10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written, 10);
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec![("t".to_string(), 10), ("other".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn gives_up_when_retries_are_exhausted() {
        struct NeverApplies;

        #[async_trait]
        impl ItemWriter for NeverApplies {
            async fn batch_write(
                &self,
                table: &str,
                requests: &[WriteRequest],
            ) -> Result<BatchWriteOutput, StoreError> {
                let mut output = BatchWriteOutput::default();
                output
                    .unprocessed
                    .insert(table.to_string(), requests.to_vec());
                Ok(output)
            }

            async fn put_item(&self, _table: &str, _row: Row) -> Result<(), StoreError> {
                Ok(())
            }
        }

        let writer = BatchWriter::new(Arc::new(NeverApplies)).with_retry(RetryPolicy::immediate(2));
        let err = writer
            .write("t", puts(3), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.written(), Some(0));
        assert!(matches!(
            err,
            ProcessingError::PartialWrite { ref source, .. }
                if matches!(**source, ProcessingError::UnprocessedRetriesExhausted { remaining: 3, .. })
        ));
    }

    #[tokio::test]
    async fn store_error_reports_rows_already_written() {
        let store = Arc::new(Recorder {
            fail_on_call: Some(2),
            ..Default::default()
        });
        let writer = BatchWriter::new(store);

        let err = writer
            .write("t", puts(30), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.written(), Some(25));
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_writing() {
        let store = Arc::new(Recorder::default());
        let writer = BatchWriter::new(store.clone());
        let token = CancellationToken::new();
        token.cancel();

        let err = writer.write("t", puts(5), &token).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(store.calls.lock().unwrap().is_empty());
    }
}

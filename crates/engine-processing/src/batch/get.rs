use crate::error::{BoxError, ProcessingError};
use engine_core::{connectors::source::PageSource, metrics::Metrics, retry::RetryPolicy};
use model::records::{
    batch::{BatchGetRequest, MAX_BATCH_GET},
    row::Row,
};
use std::{collections::BTreeMap, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fetches items by key, at most 100 keys per store call, re-requesting
/// unprocessed keys with the same backoff as [`super::writer::BatchWriter`].
#[derive(Clone)]
pub struct BatchGetter {
    source: Arc<dyn PageSource>,
    retry: RetryPolicy,
    metrics: Metrics,
}

impl BatchGetter {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
            metrics: Metrics::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Calls `callback` for every returned item and returns how many there were.
    /// A callback error stops the fetch.
    pub async fn get_all<F>(
        &self,
        request: BatchGetRequest,
        mut callback: F,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError>
    where
        F: FnMut(Row) -> Result<(), BoxError> + Send,
    {
        if request.table.is_empty() {
            return Err(model::core::error::ConfigError::EmptyTableName.into());
        }

        let BatchGetRequest {
            table,
            keys,
            projection,
            consistent_read,
        } = request;

        let mut delivered = 0usize;
        let mut keys = keys.into_iter().peekable();
        while keys.peek().is_some() {
            let chunk: Vec<Row> = keys.by_ref().take(MAX_BATCH_GET).collect();
            let mut pending = BTreeMap::from([(table.clone(), chunk)]);
            let mut round = 0usize;

            loop {
                if cancel.is_cancelled() {
                    return Err(ProcessingError::Cancelled);
                }
                round += 1;
                let mut leftover: BTreeMap<String, Vec<Row>> = BTreeMap::new();

                for (target, keys) in pending {
                    let req = BatchGetRequest {
                        table: target.clone(),
                        keys,
                        projection: projection.clone(),
                        consistent_read,
                    };
                    let output = self
                        .source
                        .batch_get(&req)
                        .await
                        .map_err(|e| ProcessingError::store(&target, e))?;

                    for (t, rows) in output.responses {
                        debug!(table = %t, rows = rows.len(), "Batch get returned items");
                        self.metrics.record_page(rows.len());
                        for row in rows {
                            callback(row).map_err(ProcessingError::Callback)?;
                            delivered += 1;
                        }
                    }
                    for (t, unprocessed) in output.unprocessed {
                        if !unprocessed.is_empty() {
                            leftover.entry(t).or_default().extend(unprocessed);
                        }
                    }
                }

                if leftover.is_empty() {
                    break;
                }

                let remaining: usize = leftover.values().map(Vec::len).sum();
                if !self.retry.allows(round) {
                    return Err(ProcessingError::UnprocessedRetriesExhausted {
                        table: table.clone(),
                        remaining,
                    });
                }

                let delay = self.retry.backoff_delay(round);
                warn!(table = %table, round, remaining, "Store left keys unprocessed, re-requesting");
                self.metrics.increment_retries(remaining as u64);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProcessingError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                pending = leftover;
            }
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_core::error::StoreError;
    use model::{
        pagination::{
            descriptor::{QueryDescriptor, ScanDescriptor},
            page::Page,
        },
        records::batch::BatchGetOutput,
    };
    use std::sync::Mutex;

    /// Returns every key as an item, holding back the last key of the first call.
    #[derive(Default)]
    struct Echo {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl PageSource for Echo {
        async fn scan(&self, _request: &ScanDescriptor) -> Result<Page, StoreError> {
            Ok(Page::default())
        }

        async fn query(&self, _request: &QueryDescriptor) -> Result<Page, StoreError> {
            Ok(Page::default())
        }

        async fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetOutput, StoreError> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(request.keys.len());
                calls.len() == 1
            };

            let mut keys = request.keys.clone();
            let mut output = BatchGetOutput::default();
            if first {
                if let Some(held) = keys.pop() {
                    output.unprocessed.insert(request.table.clone(), vec![held]);
                }
            }
            output.responses.insert(request.table.clone(), keys);
            Ok(output)
        }
    }

    fn keys(n: usize) -> Vec<Row> {
        (0..n).map(|i| Row::new().with("PK", i as i64)).collect()
    }

    #[tokio::test]
    async fn splits_keys_and_retries_unprocessed() {
        let source = Arc::new(Echo::default());
        let getter = BatchGetter::new(source.clone()).with_retry(RetryPolicy::immediate(3));

        let mut seen = Vec::new();
        let count = getter
            .get_all(
                BatchGetRequest::new("items", keys(150)),
                |row| {
                    seen.push(row);
                    Ok(())
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(count, 150);
        assert_eq!(seen.len(), 150);
        assert_eq!(*source.calls.lock().unwrap(), vec![100, 1, 50]);
    }

    #[tokio::test]
    async fn callback_error_stops_fetching() {
        let source = Arc::new(Echo::default());
        let getter = BatchGetter::new(source.clone());

        let err = getter
            .get_all(
                BatchGetRequest::new("items", keys(150)),
                |_| Err("stop".into()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessingError::Callback(_)));
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }
}

use crate::{error::ProcessingError, first_error::FirstError, iter::pager::Pager};
use engine_config::settings::validated::ValidatedSettings;
use engine_core::{connectors::source::PageSource, metrics::Metrics};
use model::{
    core::error::ConfigError,
    pagination::{
        descriptor::{MAX_TOTAL_SEGMENTS, ScanDescriptor, Segment},
        page::Page,
    },
};
use std::{future::Future, sync::Arc};
use tokio::{sync::Mutex, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Scans a table with one worker per segment and hands every page to a
/// shared callback.
///
/// The first failure from any worker cancels the rest and is returned.
/// Rows arrive in store order within a segment and in no particular order
/// across segments.
#[derive(Clone)]
pub struct ParallelScan {
    source: Arc<dyn PageSource>,
    segments: usize,
    serialize_callback: bool,
    metrics: Metrics,
}

impl ParallelScan {
    pub fn new(source: Arc<dyn PageSource>, segments: usize) -> Self {
        Self {
            source,
            segments,
            serialize_callback: true,
            metrics: Metrics::new(),
        }
    }

    pub fn from_settings(source: Arc<dyn PageSource>, settings: &ValidatedSettings) -> Self {
        Self::new(source, settings.segments())
            .serialize_callback(settings.serialize_callback())
    }

    /// When set, at most one callback runs at a time across all workers.
    /// Otherwise the callback must tolerate concurrent calls.
    pub fn serialize_callback(mut self, serialize: bool) -> Self {
        self.serialize_callback = serialize;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn run<F, Fut>(
        &self,
        template: ScanDescriptor,
        callback: F,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError>
    where
        F: Fn(Page) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProcessingError>> + Send + 'static,
    {
        if self.segments == 0 || self.segments > MAX_TOTAL_SEGMENTS as usize {
            return Err(ConfigError::InvalidSegmentCount(self.segments).into());
        }
        template.validate()?;

        let total = self.segments as u32;
        let token = cancel.child_token();
        let _guard = token.clone().drop_guard();
        let first = FirstError::new(token.clone());
        let callback = Arc::new(callback);
        let lock = Arc::new(Mutex::new(()));

        info!(table = %template.table, segments = total, "Starting parallel scan");

        let mut workers = JoinSet::new();
        for index in 0..total {
            let request = template.clone().with_segment(Segment { index, total });
            let worker = SegmentWorker {
                source: self.source.clone(),
                callback: callback.clone(),
                lock: self.serialize_callback.then(|| lock.clone()),
                token: token.clone(),
                metrics: self.metrics.clone(),
            };
            let first = first.clone();

            workers.spawn(async move {
                if let Err(e) = worker.run(request).await {
                    // Failures observed after cancellation are fallout, not causes.
                    if !worker.token.is_cancelled() {
                        first.record(e);
                    }
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                first.record(ProcessingError::TaskJoin(e));
            }
        }

        match first.into_error() {
            Some(e) => {
                error!(table = %template.table, error = %e, "Parallel scan failed");
                Err(e)
            }
            None if cancel.is_cancelled() => Err(ProcessingError::Cancelled),
            None => {
                info!(table = %template.table, "Parallel scan finished");
                Ok(())
            }
        }
    }
}

struct SegmentWorker<F> {
    source: Arc<dyn PageSource>,
    callback: Arc<F>,
    lock: Option<Arc<Mutex<()>>>,
    token: CancellationToken,
    metrics: Metrics,
}

impl<F, Fut> SegmentWorker<F>
where
    F: Fn(Page) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessingError>> + Send + 'static,
{
    async fn run(&self, request: ScanDescriptor) -> Result<(), ProcessingError> {
        let segment = request.segment.map(|s| s.index).unwrap_or_default();
        let mut pager = Pager::new(self.source.clone(), request, &self.token)?
            .with_metrics(self.metrics.clone());

        let mut pages = 0usize;
        while let Some(page) = pager.next_page().await? {
            pages += 1;
            match &self.lock {
                Some(lock) => {
                    let _held = tokio::select! {
                        _ = self.token.cancelled() => return Err(ProcessingError::Cancelled),
                        held = lock.lock() => held,
                    };
                    (self.callback)(page).await?;
                }
                None => (self.callback)(page).await?,
            }
        }

        debug!(segment, pages, "Segment exhausted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::connectors::{
        destination::ItemWriter,
        memory::{InMemoryStore, KeySchema},
    };
    use model::records::row::Row;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn store_with(rows: i64) -> Arc<InMemoryStore> {
        let store = InMemoryStore::new().with_page_size(7);
        store.create_table("t", KeySchema::hash("PK")).await;
        for i in 0..rows {
            store.put_item("t", Row::new().with("PK", i)).await.unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_row_is_delivered_once() {
        let store = store_with(100).await;
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        ParallelScan::new(store, 5)
            .serialize_callback(false)
            .run(
                ScanDescriptor::new("t"),
                move |page: Page| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(page.len(), Ordering::SeqCst);
                        Ok::<(), ProcessingError>(())
                    }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn zero_segments_is_a_configuration_error() {
        let store = store_with(0).await;
        let err = ParallelScan::new(store, 0)
            .run(
                ScanDescriptor::new("t"),
                |_page: Page| async { Ok::<(), ProcessingError>(()) },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::Configuration(ConfigError::InvalidSegmentCount(0))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn callback_error_is_returned() {
        let store = store_with(50).await;
        let err = ParallelScan::new(store, 3)
            .run(
                ScanDescriptor::new("t"),
                |_page: Page| async { Err::<(), _>(ProcessingError::callback("rejected")) },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Callback(_)));
    }

    #[tokio::test]
    async fn cancelled_parent_returns_cancelled() {
        let store = store_with(10).await;
        let token = CancellationToken::new();
        token.cancel();

        let err = ParallelScan::new(store, 2)
            .run(
                ScanDescriptor::new("t"),
                |_page: Page| async { Ok::<(), ProcessingError>(()) },
                &token,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}

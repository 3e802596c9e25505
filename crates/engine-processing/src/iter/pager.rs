use crate::error::ProcessingError;
use engine_core::{connectors::source::PageRequest, connectors::source::PageSource, metrics::Metrics};
use futures::Stream;
use model::pagination::page::Page;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Pulls the pages of one scan or query, following continuation tokens
/// until the store reports no more.
pub struct Pager<R: PageRequest> {
    source: Arc<dyn PageSource>,
    request: R,
    cancel: CancellationToken,
    metrics: Metrics,
    done: bool,
}

impl<R: PageRequest> Pager<R> {
    pub fn new(
        source: Arc<dyn PageSource>,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<Self, ProcessingError> {
        request.validate()?;
        Ok(Self {
            source,
            request,
            cancel: cancel.clone(),
            metrics: Metrics::new(),
            done: false,
        })
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// The request the next call will issue.
    pub fn request(&self) -> &R {
        &self.request
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetches the next page, or `None` once the previous page carried no token.
    pub async fn next_page(&mut self) -> Result<Option<Page>, ProcessingError> {
        if self.done {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return Err(ProcessingError::Cancelled);
        }

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            res = self.request.fetch(self.source.as_ref()) => Some(res),
        };

        let page = match fetched {
            None => {
                self.done = true;
                return Err(ProcessingError::Cancelled);
            }
            Some(Err(e)) => {
                self.done = true;
                return Err(ProcessingError::store(self.request.table(), e));
            }
            Some(Ok(page)) => page,
        };

        self.metrics.record_page(page.len());
        debug!(
            table = self.request.table(),
            rows = page.len(),
            more = page.has_more(),
            "Fetched page"
        );

        self.done = page.next.is_none();
        self.request.set_start_key(page.next.clone());
        Ok(Some(page))
    }

    /// Adapts the pager into a stream that ends after the last page or the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Page, ProcessingError>> {
        futures::stream::unfold(self, |mut pager| async move {
            match pager.next_page().await {
                Ok(Some(page)) => Some((Ok(page), pager)),
                Ok(None) => None,
                Err(e) => Some((Err(e), pager)),
            }
        })
    }
}

use crate::{
    error::{BoxError, ProcessingError},
    iter::pager::Pager,
};
use engine_core::{
    connectors::source::{PageRequest, PageSource},
    metrics::Metrics,
};
use model::pagination::{cursor::ContinuationToken, page::Page};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Paging with the request's `limit` read as a cap on the total number of
/// rows across all pages instead of a per-request cap.
///
/// Pages without rows are skipped. When the cap falls inside a page, that
/// page is trimmed and its token rebuilt from the cursor fields of its last
/// kept row, so a caller can resume right after it.
pub struct LimitedPager<R: PageRequest> {
    pager: Pager<R>,
    limit: Option<usize>,
    cursor_fields: Vec<String>,
    seen: usize,
    finished: bool,
}

impl<R: PageRequest> LimitedPager<R> {
    /// `page_size` replaces the request limit on the wire while a total cap
    /// is active; `None` leaves the page size to the store.
    pub fn new(
        source: Arc<dyn PageSource>,
        mut request: R,
        page_size: Option<usize>,
        cursor_fields: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Self, ProcessingError> {
        request.validate()?;
        let limit = request.limit();
        if limit.is_some() {
            request.set_limit(page_size);
        }

        Ok(Self {
            pager: Pager::new(source, request, cancel)?,
            limit,
            cursor_fields,
            seen: 0,
            finished: false,
        })
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.pager = self.pager.with_metrics(metrics);
        self
    }

    /// Rows handed out so far.
    pub fn seen(&self) -> usize {
        self.seen
    }

    pub async fn next_page(&mut self) -> Result<Option<Page>, ProcessingError> {
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.limit.is_some_and(|limit| self.seen >= limit) {
                self.finished = true;
                return Ok(None);
            }

            let Some(mut page) = self.pager.next_page().await? else {
                self.finished = true;
                return Ok(None);
            };
            if page.rows.is_empty() {
                continue;
            }

            if let Some(limit) = self.limit {
                let remaining = limit - self.seen;
                if page.rows.len() > remaining {
                    page.rows.truncate(remaining);
                    page.next = page
                        .rows
                        .last()
                        .and_then(|row| ContinuationToken::from_fields(row, &self.cursor_fields));
                    page.count = Some(page.rows.len());
                    self.finished = true;
                    debug!(limit, kept = remaining, "Trimmed final page to the limit");
                }
            }

            self.seen += page.rows.len();
            return Ok(Some(page));
        }
    }

    /// Hands every remaining page to `callback` and returns the rows seen.
    pub async fn for_each<F>(mut self, mut callback: F) -> Result<usize, ProcessingError>
    where
        F: FnMut(Page) -> Result<(), BoxError> + Send,
    {
        while let Some(page) = self.next_page().await? {
            callback(page).map_err(ProcessingError::Callback)?;
        }
        Ok(self.seen)
    }
}

/// Runs `callback` on every page of a limit-aware iteration.
///
/// A callback error stops the iteration and is returned. Returns the number
/// of rows delivered.
pub async fn iterate<R, F>(
    source: Arc<dyn PageSource>,
    request: R,
    page_size: Option<usize>,
    cursor_fields: Vec<String>,
    callback: F,
    cancel: &CancellationToken,
) -> Result<usize, ProcessingError>
where
    R: PageRequest,
    F: FnMut(Page) -> Result<(), BoxError> + Send,
{
    LimitedPager::new(source, request, page_size, cursor_fields, cancel)?
        .for_each(callback)
        .await
}

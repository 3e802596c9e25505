use crate::{batch::writer::BatchWriter, error::ProcessingError, iter::limited::LimitedPager};
use engine_core::connectors::source::{PageRequest, PageSource};
use model::{
    core::error::ConfigError,
    pagination::descriptor::{QueryDescriptor, ScanDescriptor},
    records::{key::KeyExtractor, write::WriteRequest},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Deletes every item a scan or query matches, one page at a time.
///
/// Pages are read sequentially; each page becomes one batched delete.
/// Deletes already issued stay applied when a later page fails.
pub struct DeletionSweeper {
    source: Arc<dyn PageSource>,
    writer: BatchWriter,
    page_size: Option<usize>,
}

impl DeletionSweeper {
    pub fn new(source: Arc<dyn PageSource>, writer: BatchWriter) -> Self {
        Self {
            source,
            writer,
            page_size: None,
        }
    }

    /// Page size used while the request's limit caps the total deleted.
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size;
        self
    }

    pub async fn query_delete(
        &self,
        table: &str,
        request: QueryDescriptor,
        keys: &dyn KeyExtractor,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        self.sweep(table, request, keys, cancel).await
    }

    pub async fn scan_delete(
        &self,
        table: &str,
        request: ScanDescriptor,
        keys: &dyn KeyExtractor,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        self.sweep(table, request, keys, cancel).await
    }

    /// Returns how many items were deleted.
    pub async fn sweep<R: PageRequest>(
        &self,
        table: &str,
        request: R,
        keys: &dyn KeyExtractor,
        cancel: &CancellationToken,
    ) -> Result<usize, ProcessingError> {
        if table.is_empty() {
            return Err(ConfigError::EmptyTableName.into());
        }
        let key_fields = keys.key_fields();
        if key_fields.is_empty() || key_fields.iter().any(String::is_empty) {
            return Err(ConfigError::MissingKeyFields.into());
        }

        let mut pager = LimitedPager::new(
            self.source.clone(),
            request,
            self.page_size,
            key_fields.to_vec(),
            cancel,
        )?
        .with_metrics(self.writer.metrics().clone());

        let mut deleted = 0usize;
        let mut pages = 0usize;
        while let Some(page) = pager.next_page().await? {
            pages += 1;
            let requests: Vec<WriteRequest> = page
                .rows
                .iter()
                .map(|row| WriteRequest::delete(keys.extract(row)))
                .collect();

            debug!(table, page = pages, deletes = requests.len(), "Deleting page");
            let written = match self.writer.write(table, requests, cancel).await {
                Ok(written) => written,
                Err(ProcessingError::PartialWrite { written, source }) => {
                    return Err(ProcessingError::PartialWrite {
                        written: deleted + written,
                        source,
                    });
                }
                Err(e) => return Err(e.partial(deleted)),
            };
            deleted += written;
        }

        info!(table, deleted, pages, "Sweep finished");
        Ok(deleted)
    }
}

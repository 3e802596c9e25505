use crate::{error::ProcessingError, iter::pager::Pager};
use engine_core::{connectors::source::PageSource, metrics::Metrics};
use model::pagination::descriptor::ScanDescriptor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Counts the items matching a scan without transferring them.
pub async fn scan_count(
    source: Arc<dyn PageSource>,
    descriptor: ScanDescriptor,
    metrics: Metrics,
    cancel: &CancellationToken,
) -> Result<usize, ProcessingError> {
    let table = descriptor.table.clone();
    let mut pager = Pager::new(source, descriptor.count_only(), cancel)?.with_metrics(metrics);

    let mut total = 0usize;
    while let Some(page) = pager.next_page().await? {
        total += page.count.unwrap_or(page.rows.len());
    }

    debug!(table = %table, total, "Counted items");
    Ok(total)
}

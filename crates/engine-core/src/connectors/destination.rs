use crate::{connectors::source::PageSource, error::StoreError};
use async_trait::async_trait;
use model::records::{batch::BatchWriteOutput, row::Row, write::WriteRequest};

/// Write side of the store.
#[async_trait]
pub trait ItemWriter: Send + Sync {
    /// Submits at most [`model::records::batch::MAX_BATCH_WRITE`] operations.
    /// Operations the store did not apply come back in the output.
    async fn batch_write(
        &self,
        table: &str,
        requests: &[WriteRequest],
    ) -> Result<BatchWriteOutput, StoreError>;

    /// Inserts or replaces a single item.
    async fn put_item(&self, table: &str, row: Row) -> Result<(), StoreError>;
}

/// A store offering both reads and writes.
pub trait TableStore: PageSource + ItemWriter {}

impl<T: PageSource + ItemWriter + ?Sized> TableStore for T {}

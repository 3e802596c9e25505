use crate::records::row::Row;
use serde::{Deserialize, Serialize};

/// One operation inside a batch write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteRequest {
    /// Insert or fully replace the item.
    Put(Row),
    /// Remove the item addressed by the key row.
    Delete(Row),
}

impl WriteRequest {
    pub fn put(row: Row) -> Self {
        WriteRequest::Put(row)
    }

    pub fn delete(key: Row) -> Self {
        WriteRequest::Delete(key)
    }

    pub fn row(&self) -> &Row {
        match self {
            WriteRequest::Put(row) | WriteRequest::Delete(row) => row,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, WriteRequest::Delete(_))
    }
}

use crate::records::{row::Row, write::WriteRequest};
use std::collections::BTreeMap;

/// Largest number of operations the store accepts in one batch write.
pub const MAX_BATCH_WRITE: usize = 25;

/// Largest number of keys the store accepts in one batch get.
pub const MAX_BATCH_GET: usize = 100;

/// Response of a batch write: anything the store did not apply this round,
/// grouped by the table it is addressed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteOutput {
    pub unprocessed: BTreeMap<String, Vec<WriteRequest>>,
}

impl BatchWriteOutput {
    pub fn unprocessed_count(&self) -> usize {
        self.unprocessed.values().map(Vec::len).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.unprocessed_count() == 0
    }
}

/// Keys to fetch from a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchGetRequest {
    pub table: String,
    pub keys: Vec<Row>,
    pub projection: Vec<String>,
    pub consistent_read: bool,
}

impl BatchGetRequest {
    pub fn new(table: impl Into<String>, keys: Vec<Row>) -> Self {
        Self {
            table: table.into(),
            keys,
            projection: Vec::new(),
            consistent_read: false,
        }
    }

    pub fn with_projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn consistent(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchGetOutput {
    pub responses: BTreeMap<String, Vec<Row>>,
    pub unprocessed: BTreeMap<String, Vec<Row>>,
}

impl BatchGetOutput {
    pub fn unprocessed_count(&self) -> usize {
        self.unprocessed.values().map(Vec::len).sum()
    }
}

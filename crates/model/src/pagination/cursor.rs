use crate::records::row::Row;
use serde::{Deserialize, Serialize};

/// Opaque resume point: the key attributes of the last item a page returned.
///
/// Passing it back as a request's start key continues paging right after
/// that item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ContinuationToken(Row);

impl ContinuationToken {
    pub fn new(key: Row) -> Self {
        Self(key)
    }

    /// Builds a token from the named fields of `row`.
    /// Returns `None` when none of the fields are present.
    pub fn from_fields<S: AsRef<str>>(row: &Row, fields: &[S]) -> Option<Self> {
        let key = row.project(fields);
        if key.is_empty() { None } else { Some(Self(key)) }
    }

    pub fn key(&self) -> &Row {
        &self.0
    }

    pub fn into_row(self) -> Row {
        self.0
    }
}

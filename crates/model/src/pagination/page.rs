use crate::{pagination::cursor::ContinuationToken, records::row::Row};

/// One response page of a scan or query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    /// Where the next page starts; `None` once the result set is exhausted.
    pub next: Option<ContinuationToken>,
    /// Matched item count as reported by the store. Set for count-only requests.
    pub count: Option<usize>,
}

impl Page {
    pub fn new(rows: Vec<Row>, next: Option<ContinuationToken>) -> Self {
        let count = Some(rows.len());
        Self { rows, next, count }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

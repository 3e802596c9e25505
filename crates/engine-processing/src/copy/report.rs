use chrono::{DateTime, Utc};
use engine_core::metrics::MetricsSnapshot;

/// Outcome of a completed table copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub rows_read: u64,
    pub rows_written: u64,
    /// Rows dropped because the error policy chose to continue.
    pub rows_failed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CopyReport {
    pub fn from_snapshot(
        snapshot: MetricsSnapshot,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            rows_read: snapshot.rows_read,
            rows_written: snapshot.rows_written,
            rows_failed: snapshot.failure_count,
            started_at,
            finished_at,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

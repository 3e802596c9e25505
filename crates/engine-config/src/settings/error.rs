use std::path::PathBuf;
use thiserror::Error;

/// Errors raised when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Batch size outside `1..=25`.
    #[error("Invalid batch size {0}: must be between 1 and 25")]
    InvalidBatchSize(usize),

    #[error("Invalid unprocessed-item retry settings: {0}")]
    InvalidRetry(String),

    #[error("Invalid segment count {0}: must be at least 1")]
    InvalidSegments(usize),

    #[error("Invalid worker count {0}: must be at least 1")]
    InvalidWorkers(usize),

    #[error("Invalid channel capacity {0}: must be at least 1")]
    InvalidChannelCapacity(usize),

    #[error("Invalid page size {0}: must be at least 1")]
    InvalidPageSize(usize),

    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

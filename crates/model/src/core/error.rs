use thiserror::Error;

/// Configuration problems detected before any request reaches the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Table name must not be empty")]
    EmptyTableName,

    #[error("Segment {index} is out of range for {total} total segments")]
    SegmentOutOfRange { index: u32, total: u32 },

    #[error("Invalid total segment count: {0}")]
    InvalidSegmentCount(usize),

    #[error("Limit must be greater than zero")]
    ZeroLimit,

    #[error("Query requires a key condition expression")]
    MissingKeyCondition,

    #[error("At least one key field is required")]
    MissingKeyFields,

    #[error("Expression placeholder '{0}' has no bound value")]
    UnboundPlaceholder(String),
}

use thiserror::Error;

/// Failures reported by the backing store or the transport in front of it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request throttled by the store: {0}")]
    Throttled(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Request rejected by the store: {0}")]
    Validation(String),

    #[error("Unexpected store error: {0}")]
    Unexpected(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Provisioned-throughput style rejections.
    pub fn is_throttling(&self) -> bool {
        matches!(self, StoreError::Throttled(_))
    }
}

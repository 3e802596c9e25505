use engine_config::settings::error::SettingsError;
use engine_core::error::StoreError;
use model::core::error::ConfigError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The error type of every orchestration operation.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Store request failed for table '{table}': {source}")]
    Store {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Callback failed: {0}")]
    Callback(#[source] BoxError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Unprocessed items for table '{table}' remained after retries were exhausted ({remaining} left)")]
    UnprocessedRetriesExhausted { table: String, remaining: usize },

    /// A batch write stopped early; `written` items were applied before the failure.
    #[error("Batch write failed after {written} items were written: {source}")]
    PartialWrite {
        written: usize,
        #[source]
        source: Box<ProcessingError>,
    },

    #[error("The row channel was closed unexpectedly")]
    ChannelClosed,

    /// A worker task panicked or was aborted.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ProcessingError {
    pub fn store(table: impl Into<String>, source: StoreError) -> Self {
        ProcessingError::Store {
            table: table.into(),
            source,
        }
    }

    pub fn callback(err: impl Into<BoxError>) -> Self {
        ProcessingError::Callback(err.into())
    }

    pub fn partial(self, written: usize) -> Self {
        match self {
            ProcessingError::PartialWrite { .. } => self,
            other => ProcessingError::PartialWrite {
                written,
                source: Box::new(other),
            },
        }
    }

    /// True when the operation stopped because its token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ProcessingError::Cancelled => true,
            ProcessingError::PartialWrite { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Items applied before a batch write failed.
    pub fn written(&self) -> Option<usize> {
        match self {
            ProcessingError::PartialWrite { written, .. } => Some(*written),
            _ => None,
        }
    }
}

impl From<SettingsError> for ProcessingError {
    fn from(err: SettingsError) -> Self {
        ProcessingError::Settings(err.to_string())
    }
}

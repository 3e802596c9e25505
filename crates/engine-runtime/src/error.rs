use engine_config::settings::error::SettingsError;
use engine_processing::error::ProcessingError;
use thiserror::Error;

/// Errors raised while setting up a client or its telemetry.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

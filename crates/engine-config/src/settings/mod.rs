use crate::settings::{
    batch::BatchSettings,
    copy::CopySettings,
    error::SettingsError,
    scan::{IterationSettings, ScanSettings},
    validated::{ValidatedSettings, ValidatedSettingsBuilder},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub mod batch;
pub mod copy;
pub mod error;
pub mod scan;
pub mod validated;

/// Settings as written by the user. Every field has a default, so `{}` is a
/// valid document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawSettings {
    pub batch: BatchSettings,
    pub scan: ScanSettings,
    pub copy: CopySettings,
    pub iteration: IterationSettings,
}

impl RawSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading settings file");
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Checks every value and freezes the result.
    pub fn validate(&self) -> Result<ValidatedSettings, SettingsError> {
        let retry = &self.batch.unprocessed_retry;
        let mut builder = ValidatedSettingsBuilder::new()
            .max_batch_size(self.batch.max_batch_size)
            .retry(retry.max_attempts, retry.base_delay_ms, retry.max_delay_ms)
            .segments(self.scan.segments)
            .serialize_callback(self.scan.serialize_callback)
            .workers(self.copy.workers)
            .channel_capacity(self.copy.effective_capacity());
        if let Some(page_size) = self.iteration.page_size {
            builder = builder.page_size(page_size);
        }

        let settings = builder.build()?;
        info!(
            max_batch_size = settings.max_batch_size(),
            segments = settings.segments(),
            workers = settings.workers(),
            "Settings validated"
        );
        Ok(settings)
    }
}

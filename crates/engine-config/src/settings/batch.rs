use engine_core::retry::RetryPolicy;
use model::records::batch::MAX_BATCH_WRITE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSettings {
    /// Operations per batch-write call.
    pub max_batch_size: usize,
    pub unprocessed_retry: UnprocessedRetrySettings,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_WRITE,
            unprocessed_retry: UnprocessedRetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnprocessedRetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for UnprocessedRetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 50,
            max_delay_ms: 2000,
        }
    }
}

impl UnprocessedRetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

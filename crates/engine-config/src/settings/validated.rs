use crate::settings::error::SettingsError;
use engine_core::retry::RetryPolicy;
use model::records::batch::MAX_BATCH_WRITE;
use std::time::Duration;

/// Immutable, validated configuration shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSettings {
    /// Operations per batch-write call, at most 25
    max_batch_size: usize,
    /// Backoff for resubmitting unprocessed items
    retry_policy: RetryPolicy,
    /// Default parallel scan segment count
    segments: usize,
    /// Whether parallel scan callbacks run one at a time
    serialize_callback: bool,
    /// Copy writer tasks
    workers: usize,
    /// Copy row channel capacity
    channel_capacity: usize,
    /// Page size requested while a client-side limit is active
    page_size: Option<usize>,
}

impl Default for ValidatedSettings {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_WRITE,
            retry_policy: RetryPolicy::default(),
            segments: 4,
            serialize_callback: true,
            workers: 4,
            channel_capacity: 4,
            page_size: None,
        }
    }
}

impl ValidatedSettings {
    pub fn builder() -> ValidatedSettingsBuilder {
        ValidatedSettingsBuilder::new()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn serialize_callback(&self) -> bool {
        self.serialize_callback
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn page_size(&self) -> Option<usize> {
        self.page_size
    }
}

#[derive(Debug, Default)]
pub struct ValidatedSettingsBuilder {
    pub max_batch_size: Option<usize>,
    pub retry: Option<(usize, u64, u64)>,
    pub segments: Option<usize>,
    pub serialize_callback: Option<bool>,
    pub workers: Option<usize>,
    pub channel_capacity: Option<usize>,
    pub page_size: Option<usize>,
}

impl ValidatedSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }

    pub fn retry(mut self, max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.retry = Some((max_attempts, base_delay_ms, max_delay_ms));
        self
    }

    pub fn segments(mut self, segments: usize) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn serialize_callback(mut self, serialize_callback: bool) -> Self {
        self.serialize_callback = Some(serialize_callback);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = Some(channel_capacity);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn build(self) -> Result<ValidatedSettings, SettingsError> {
        let defaults = ValidatedSettings::default();

        let max_batch_size = self.max_batch_size.unwrap_or(defaults.max_batch_size);
        if max_batch_size == 0 || max_batch_size > MAX_BATCH_WRITE {
            return Err(SettingsError::InvalidBatchSize(max_batch_size));
        }

        let retry_policy = match self.retry {
            Some((max_attempts, base_ms, max_ms)) => {
                if max_attempts == 0 {
                    return Err(SettingsError::InvalidRetry(
                        "max_attempts must be at least 1".to_string(),
                    ));
                }
                if max_ms < base_ms {
                    return Err(SettingsError::InvalidRetry(format!(
                        "max_delay_ms ({max_ms}) is below base_delay_ms ({base_ms})"
                    )));
                }
                RetryPolicy::new(
                    max_attempts,
                    Duration::from_millis(base_ms),
                    Duration::from_millis(max_ms),
                )
            }
            None => defaults.retry_policy,
        };

        let segments = self.segments.unwrap_or(defaults.segments);
        if segments == 0 {
            return Err(SettingsError::InvalidSegments(segments));
        }

        let workers = self.workers.unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(SettingsError::InvalidWorkers(workers));
        }

        let channel_capacity = self.channel_capacity.unwrap_or(workers);
        if channel_capacity == 0 {
            return Err(SettingsError::InvalidChannelCapacity(channel_capacity));
        }

        if self.page_size == Some(0) {
            return Err(SettingsError::InvalidPageSize(0));
        }

        Ok(ValidatedSettings {
            max_batch_size,
            retry_policy,
            segments,
            serialize_callback: self.serialize_callback.unwrap_or(defaults.serialize_callback),
            workers,
            channel_capacity,
            page_size: self.page_size,
        })
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSettings {
    /// Default number of parallel scan segments.
    pub segments: usize,
    /// Run page callbacks one at a time across segments.
    pub serialize_callback: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            segments: 4,
            serialize_callback: true,
        }
    }
}

/// Page size sent to the store while a client-side total limit is active.
/// Unset means the store's default page size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IterationSettings {
    pub page_size: Option<usize>,
}

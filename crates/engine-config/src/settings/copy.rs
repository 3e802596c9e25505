use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopySettings {
    /// Writer tasks, also the number of scan segments feeding them.
    pub workers: usize,
    /// Row channel capacity; defaults to `workers`.
    pub channel_capacity: Option<usize>,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            workers: 4,
            channel_capacity: None,
        }
    }
}

impl CopySettings {
    pub fn effective_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(self.workers)
    }
}

use crate::error::ProcessingError;
use std::{fmt, sync::Arc};

/// What a copy does after a row fails to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Drop the failed row and keep copying.
    Continue,
    /// Cancel the copy, wait for in-flight writes and return the error.
    Abort,
}

type Decider = Arc<dyn Fn(&ProcessingError) -> ErrorAction + Send + Sync>;

#[derive(Clone, Default)]
pub enum ErrorPolicy {
    /// Stop on the first error.
    #[default]
    Abort,
    /// Let the caller choose per error. The closure may keep its own state.
    Decide(Decider),
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Abort => f.write_str("Abort"),
            ErrorPolicy::Decide(_) => f.write_str("Decide(..)"),
        }
    }
}

impl ErrorPolicy {
    pub fn decide_with<F>(decide: F) -> Self
    where
        F: Fn(&ProcessingError) -> ErrorAction + Send + Sync + 'static,
    {
        ErrorPolicy::Decide(Arc::new(decide))
    }

    pub fn decide(&self, err: &ProcessingError) -> ErrorAction {
        match self {
            ErrorPolicy::Abort => ErrorAction::Abort,
            ErrorPolicy::Decide(decide) => decide(err),
        }
    }

    /// Keeps copying past throttled writes, aborts on anything else.
    pub fn skip_throttled() -> Self {
        ErrorPolicy::decide_with(|err| match err {
            ProcessingError::Store { source, .. } if source.is_throttling() => {
                ErrorAction::Continue
            }
            _ => ErrorAction::Abort,
        })
    }
}

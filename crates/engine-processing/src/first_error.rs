use crate::error::ProcessingError;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Keeps the first error reported by any worker and cancels the shared
/// token when it does. Later errors are dropped without blocking.
#[derive(Debug)]
pub struct FirstError {
    slot: OnceCell<ProcessingError>,
    token: CancellationToken,
}

impl FirstError {
    pub fn new(token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            slot: OnceCell::new(),
            token,
        })
    }

    /// Returns `true` if this error was the one kept.
    pub fn record(&self, err: ProcessingError) -> bool {
        match self.slot.set(err) {
            Ok(()) => {
                self.token.cancel();
                true
            }
            Err(dropped) => {
                debug!(error = %dropped_error(dropped), "Discarding error after the first");
                false
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.initialized()
    }

    /// Takes the kept error. Yields `None` while other handles are alive.
    pub fn into_error(self: Arc<Self>) -> Option<ProcessingError> {
        Arc::into_inner(self).and_then(|first| first.slot.into_inner())
    }
}

fn dropped_error(err: tokio::sync::SetError<ProcessingError>) -> ProcessingError {
    match err {
        tokio::sync::SetError::AlreadyInitializedError(e) => e,
        tokio::sync::SetError::InitializingError(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_first_error() {
        let token = CancellationToken::new();
        let first = FirstError::new(token.clone());

        assert!(first.record(ProcessingError::ChannelClosed));
        assert!(!first.record(ProcessingError::Cancelled));
        assert!(token.is_cancelled());

        let kept = first.into_error();
        assert!(matches!(kept, Some(ProcessingError::ChannelClosed)));
    }

    #[test]
    fn untouched_slot_yields_nothing() {
        let token = CancellationToken::new();
        let first = FirstError::new(token.clone());
        assert!(!first.is_set());
        assert!(first.into_error().is_none());
        assert!(!token.is_cancelled());
    }
}

use crate::error::RuntimeError;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber. `RUST_LOG` overrides `default_level`.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_tracing(default_level: &str) -> Result<(), RuntimeError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| RuntimeError::Initialization(format!("invalid log filter: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| RuntimeError::Initialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error() {
        let _ = init_tracing("info");
        assert!(matches!(
            init_tracing("debug"),
            Err(RuntimeError::Initialization(_))
        ));
    }
}

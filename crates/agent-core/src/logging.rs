//! Structured logging bootstrap
//!
//! Installs a `tracing` subscriber configured from [`LoggingConfig`]. The
//! `RUST_LOG` environment variable, when set, overrides the configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{AgentError, Result};

/// Initialize the global subscriber
///
/// Call once at startup. A second call returns an error instead of replacing
/// the installed subscriber.
///
/// # Example
///
/// ```
/// use agent_core::config::LoggingConfig;
/// use agent_core::logging::init_logging;
///
/// let config = LoggingConfig { level: "debug".to_string(), json: false };
/// init_logging(&config).ok();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .try_init()
    };

    installed.map_err(|e| AgentError::other(format!("Logging already initialized: {e}")))?;

    tracing::info!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let config = LoggingConfig::default();
        // The first call may race with other tests in this binary; the second never succeeds.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}

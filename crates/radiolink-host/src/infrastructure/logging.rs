//! Structured logging setup.
//!
//! The filter is chosen in this order:
//!
//! 1. `RUST_LOG`, when set and valid.
//! 2. The configured level (`[general] log_level` or `--log-level`).
//! 3. `info`.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the configuration provide one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Builds a filter from a configured level, ignoring the environment.
///
/// Blank or unparsable levels fall back to [`DEFAULT_LOG_LEVEL`].
pub fn configured_filter(level: &str) -> EnvFilter {
    let level = level.trim();
    if level.is_empty() {
        return EnvFilter::new(DEFAULT_LOG_LEVEL);
    }
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns [`LoggingError::Install`] when a global subscriber is already set.
pub fn init_logging(configured_level: &str) -> Result<(), LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(configured_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_filter_uses_given_level() {
        assert_eq!(configured_filter("debug").to_string(), "debug");
    }

    #[test]
    fn test_configured_filter_accepts_per_crate_directives() {
        assert_eq!(
            configured_filter("radiolink_host=trace").to_string(),
            "radiolink_host=trace"
        );
    }

    #[test]
    fn test_blank_level_falls_back_to_info() {
        assert_eq!(configured_filter("  ").to_string(), DEFAULT_LOG_LEVEL);
    }
}

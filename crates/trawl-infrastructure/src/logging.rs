//! Structured logging with tracing.
//!
//! Centralized logging configuration using the tracing ecosystem:
//! env-filter levels from [`LoggingConfig`], optional JSON output for log
//! shippers, and a plain compact format for terminals.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber once per process.
///
/// Safe to call again (e.g. in tests); subsequent calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let result = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber was already initialized");
    }
}

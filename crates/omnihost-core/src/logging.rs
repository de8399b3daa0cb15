//! Logging bootstrap.
//!
//! Installs a global `tracing` subscriber from [`LoggingConfig`]. `RUST_LOG`
//! takes precedence over the configured directives.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{HostError, Result};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the configured level is invalid or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    config.parse_level()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directives()))
        .map_err(|e| HostError::Internal(format!("Invalid log filter: {}", e)))?;

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_file(config.file_line)
            .with_line_number(config.file_line)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_file(config.file_line)
            .with_line_number(config.file_line)
            .try_init(),
    };

    installed.map_err(|e| HostError::Internal(format!("Failed to install subscriber: {}", e)))
}

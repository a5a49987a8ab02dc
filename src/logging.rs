//! Structured logging setup
//!
//! Installs a `tracing-subscriber` registry with JSON or human-readable
//! output and an optional file copy. Library code only emits `tracing`
//! events; calling [`init_logging`] is left to the host application.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{AuthlinkError, Result};

/// Initialize logging based on configuration.
///
/// `RUST_LOG` takes precedence over `config.level`.
///
/// # Errors
///
/// Returns [`AuthlinkError::Config`] if the filter directive is invalid, the
/// log file cannot be opened, or a global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use authlink::config::LoggingConfig;
/// use authlink::logging::init_logging;
///
/// init_logging(&LoggingConfig {
///     level: "authlink=debug".to_string(),
///     json_format: true,
///     file_path: None,
/// })
/// .unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let file = match &config.file_path {
        Some(path) => Some(Arc::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AuthlinkError::Config(format!(
                        "Failed to open log file {}: {}",
                        path.display(),
                        e
                    ))
                })?,
        )),
        None => None,
    };

    let result = if config.json_format {
        let stdout_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true);
        let file_layer = file.map(|file| {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(file)
        });
        registry.with(stdout_layer).with(file_layer).try_init()
    } else {
        let stdout_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true);
        let file_layer = file.map(|file| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(file)
        });
        registry.with(stdout_layer).with(file_layer).try_init()
    };

    result.map_err(|e| AuthlinkError::Config(format!("Failed to install logger: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AuthlinkError::Config(format!("Invalid log level '{}': {}", config.level, e)))
}

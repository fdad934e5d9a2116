//! # Structured Logging Module
//!
//! Process-wide `tracing` initialisation. [`init_structured_logging`] runs at
//! most once per process; later calls are no-ops.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the console subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. If another global
/// subscriber is already installed it is left in place.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

        let json_layer = config.json.then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_level(true)
                .json()
        });
        let console_layer = (!config.json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_level(true)
                .with_ansi(true)
        });

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized; keeping the existing one"
            );
            return;
        }

        tracing::info!(
            pid = process::id(),
            level = %config.level,
            json = config.json,
            "Structured logging initialized"
        );
    });
}

/// Whether [`init_structured_logging`] has already run in this process
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

/// Log a structured command lifecycle event
pub fn log_command_operation(
    operation: &str,
    command_id: &str,
    command_name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        command_id = %command_id,
        command_name = command_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "COMMAND_OPERATION"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_is_idempotent() {
        let config = LoggingConfig::default();
        init_structured_logging(&config);
        init_structured_logging(&LoggingConfig {
            level: "trace".to_string(),
            json: true,
        });
        assert!(is_initialized());
    }
}

//! # Device Configuration
//!
//! Tunables for the task executor, the command tracker and logging. Values come
//! from an optional `config/device.toml`, an optional explicit file, then
//! `DEVICE__*` environment variables (double underscore separates nesting).
//!
//! ```rust,no_run
//! use device_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! println!("workers: {}", config.config().executor.max_workers);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration for a device runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub executor: ExecutorConfig,
    pub tracker: TrackerConfig,
    pub logging: LoggingConfig,
}

impl DeviceConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.executor.max_workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.max_workers",
                "0",
                "at least one worker thread is required",
            ));
        }
        if self.tracker.status_feed_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "tracker.status_feed_size",
                "0",
                "the status feed must hold at least one command",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Worker threads in the pool. One serialises long-running commands.
    pub max_workers: usize,
    /// Tasks queued or running before submissions are rejected; 0 is unbounded
    pub max_queue_size: usize,
    /// How long an abort waits for running tasks before disowning their
    /// threads. Unset waits for them to finish.
    pub abort_timeout_ms: Option<u64>,
}

impl ExecutorConfig {
    pub fn abort_timeout(&self) -> Option<Duration> {
        self.abort_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 1,
            max_queue_size: 64,
            abort_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Grace period between a terminal status and eviction
    pub removal_delay_ms: u64,
    /// Commands kept in the published status and progress feeds
    pub status_feed_size: usize,
}

impl TrackerConfig {
    pub fn removal_delay(&self) -> Duration {
        Duration::from_millis(self.removal_delay_ms)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            removal_delay_ms: 10_000,
            status_feed_size: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

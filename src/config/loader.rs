//! Configuration Loader
//!
//! Layers configuration sources with the `config` crate, later sources
//! overriding earlier ones:
//!
//! 1. `config/device.toml` relative to the working directory, when present
//! 2. an explicit file passed to [`ConfigManager::load_from_file`]
//! 3. `DEVICE__*` environment variables, e.g. `DEVICE__EXECUTOR__MAX_WORKERS=4`

use super::error::{ConfigResult, ConfigurationError};
use super::DeviceConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_CONFIG_FILE: &str = "config/device.toml";
const ENV_PREFIX: &str = "DEVICE";

/// Loaded, validated configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: DeviceConfig,
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load from the default file (if any) and the environment
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::build(None)
    }

    /// Load with `path` layered over the default file. `path` must exist.
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }
        Self::build(Some(path.to_path_buf()))
    }

    /// Wrap an already-built configuration, validating it
    pub fn from_config(config: DeviceConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            config_file: None,
        }))
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Explicit file the configuration was loaded from, if any
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    fn build(config_file: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder = config::Config::builder();

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            builder = builder
                .add_source(config::File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false));
        }

        if let Some(path) = &config_file {
            builder = builder.add_source(config::File::from(path.clone()).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: DeviceConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            config_file = ?config_file,
            config = %serde_json::to_string(&config)
                .unwrap_or_else(|_| "[serialization error]".to_string()),
            "Configuration loaded"
        );

        Ok(Arc::new(Self {
            config,
            config_file,
        }))
    }
}

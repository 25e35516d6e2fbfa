//! Configuration management for TVPQ
//!
//! Handles the store's own settings, the vendor picture mode configuration
//! (`allmodes.conf`) and the calibration cache that persisted picture values
//! are written through to.

mod calibration;
mod modes;

pub use calibration::{CalibrationFile, CalibrationSink, CalibrationSnapshot, ModeSelection};
pub use modes::{Capability, ModeConfig, PictureModeEntry};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tvpq_hal::TvError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Calibration cache error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

impl From<ConfigError> for TvError {
    fn from(err: ConfigError) -> Self {
        TvError::General(err.to_string())
    }
}

/// Vendor picture mode configuration
pub const GENERIC_MODE_CONFIG_FILE: &str = "/etc/tv/allmodes.conf";

/// Write-through calibration cache
pub const CALIBRATION_CACHE_FILE: &str = "/opt/tv/pq_calibration.json";

/// Store settings file
pub const STORE_CONFIG_FILE: &str = "/etc/tv/tvpq.toml";

/// Prefix for environment overrides (`TVPQ_DRIVER_TIMEOUT_MS=500`)
pub const ENV_PREFIX: &str = "TVPQ";

/// Settings of the picture settings store itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Picture mode configuration file
    pub mode_config: PathBuf,

    /// Calibration cache file
    pub calibration_file: PathBuf,

    /// Upper bound for a single driver call, in milliseconds
    pub driver_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode_config: PathBuf::from(GENERIC_MODE_CONFIG_FILE),
            calibration_file: PathBuf::from(CALIBRATION_CACHE_FILE),
            driver_timeout_ms: 200,
        }
    }
}

impl StoreConfig {
    /// Load settings: built-in defaults, then `path` (if it exists), then
    /// `TVPQ_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        tracing::info!(
            "Store config: modes={} calibration={} timeout={}ms",
            config.mode_config.display(),
            config.calibration_file.display(),
            config.driver_timeout_ms
        );
        Ok(config)
    }

    /// Load from the default settings file location
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(Some(Path::new(STORE_CONFIG_FILE)))
    }

    /// Settings pointing at files inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            mode_config: dir.join("allmodes.conf"),
            calibration_file: dir.join("pq_calibration.json"),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "driver_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn driver_timeout(&self) -> Duration {
        Duration::from_millis(self.driver_timeout_ms)
    }
}

// Configuration management for the grid trading worker

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub database_path: String,
    pub poll_interval_secs: u64,
    /// Floor applied to every bot's configured tick interval
    pub min_tick_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            database_path: "data/grid-worker.db".to_string(),
            poll_interval_secs: 10,
            min_tick_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub spot_base_url: String,
    pub futures_base_url: String,
    pub request_timeout_secs: u64,
    /// Minimum spacing between outbound calls sharing one credential
    pub min_request_interval_ms: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            spot_base_url: "https://api.binance.com".to_string(),
            futures_base_url: "https://fapi.binance.com".to_string(),
            request_timeout_secs: 30,
            min_request_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridDefaults {
    pub grid_count: u32,
    pub interval_secs: u64,
    pub stop_loss_percent: f64,
    pub investment: f64,
    /// Half-width of the auto-derived range around the current price
    pub range_percent: f64,
}

impl Default for GridDefaults {
    fn default() -> Self {
        Self {
            grid_count: 10,
            interval_secs: 30,
            stop_loss_percent: 5.0,
            investment: 1000.0,
            range_percent: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub defaults: GridDefaults,
}

impl WorkerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            return Err(ConfigError::FileNotFound(
                path.as_ref().display().to_string(),
            ));
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: WorkerConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.worker.min_tick_secs == 0 {
            return Err(ConfigError::Validation(
                "min_tick_secs must be greater than 0".to_string(),
            ));
        }

        if self.venue.spot_base_url.is_empty() || self.venue.futures_base_url.is_empty() {
            return Err(ConfigError::Validation(
                "venue base URLs must not be empty".to_string(),
            ));
        }

        if self.defaults.grid_count < 2 {
            return Err(ConfigError::Validation(
                "grid_count must be at least 2".to_string(),
            ));
        }

        if self.defaults.stop_loss_percent <= 0.0 {
            return Err(ConfigError::Validation(
                "stop_loss_percent must be positive".to_string(),
            ));
        }

        if self.defaults.investment <= 0.0 {
            return Err(ConfigError::Validation(
                "investment must be positive".to_string(),
            ));
        }

        if self.defaults.range_percent <= 0.0 || self.defaults.range_percent >= 1.0 {
            return Err(ConfigError::Validation(
                "range_percent must be between 0 and 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

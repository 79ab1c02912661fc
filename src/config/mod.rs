//! Configuration loading
//!
//! Configuration is read from a TOML file. Every section and field is
//! optional and falls back to the defaults below.
//!
//! ```toml
//! [driver]
//! poll_interval_ms = 1000
//!
//! [failure_window]
//! service = "monitoring"
//! window_seconds = 60.0
//!
//! [reservoir]
//! capacity = 1000
//! seed = 42
//! ```

use crate::error::ConfigError;
use crate::strategies::{bloom, failure_window, reservoir};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Service tracked by default
pub const DEFAULT_SERVICE: &str = "monitoring";

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub driver: DriverConfig,
    pub success_ratio: SuccessRatioConfig,
    pub failure_window: FailureWindowConfig,
    pub reservoir: ReservoirConfig,
    pub bloom: BloomConfig,
}

/// Polling loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Delay between directory polls in milliseconds
    pub poll_interval_ms: u64,
    /// Stop after this many artifacts (bounded runs); unbounded when absent
    pub max_artifacts: Option<usize>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_artifacts: None,
        }
    }
}

impl DriverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuccessRatioConfig {
    pub service: String,
}

impl Default for SuccessRatioConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureWindowConfig {
    pub service: String,
    pub window_seconds: f64,
}

impl Default for FailureWindowConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            window_seconds: failure_window::DEFAULT_WINDOW_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservoirConfig {
    pub capacity: usize,
    /// Fixed seed for reproducible sampling; drawn from the OS when absent
    pub seed: Option<u64>,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            capacity: reservoir::DEFAULT_CAPACITY,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    /// Filter size in bits
    pub size: usize,
    pub hash_count: u32,
    /// Replaces the built-in error signature vocabulary
    pub signatures: Option<Vec<String>>,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            size: bloom::DEFAULT_SIZE,
            hash_count: bloom::DEFAULT_HASH_COUNT,
            signatures: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML for this schema, and
    /// `ConfigError::ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "driver.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !(self.failure_window.window_seconds.is_finite()
            && self.failure_window.window_seconds > 0.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "failure_window.window_seconds must be positive, got {}",
                self.failure_window.window_seconds
            )));
        }
        if self.reservoir.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "reservoir.capacity must be greater than 0".to_string(),
            ));
        }
        if self.bloom.size == 0 || self.bloom.hash_count == 0 {
            return Err(ConfigError::ValidationError(
                "bloom.size and bloom.hash_count must be greater than 0".to_string(),
            ));
        }
        if matches!(&self.bloom.signatures, Some(s) if s.is_empty()) {
            return Err(ConfigError::ValidationError(
                "bloom.signatures must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}

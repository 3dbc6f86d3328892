//! Engine configuration.
//!
//! Loaded from TOML, then overridden from the environment, then validated.
//! Every field has a default so an absent file yields a working engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::types::AlertThresholds;

/// Shortest accepted scan interval.
pub const MIN_SCAN_INTERVAL_SECS: u64 = 30;
/// Longest accepted scan interval.
pub const MAX_SCAN_INTERVAL_SECS: u64 = 86_400;
/// Consecutive failures before the diagnostic alert fires.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
/// Name fragment of the language server process.
pub const DEFAULT_PROCESS_PATTERN: &str = "language_server";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[cfg(feature = "toml")]
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_process_pattern")]
    pub process_pattern: String,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default)]
    pub thresholds: AlertThresholds,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_scan_interval() -> u64 {
    120
}

fn default_process_pattern() -> String {
    DEFAULT_PROCESS_PATTERN.to_string()
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            process_pattern: default_process_pattern(),
            failure_threshold: default_failure_threshold(),
            thresholds: AlertThresholds::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Clamp a requested scan interval into `[30, 86400]` seconds.
pub fn normalize_scan_interval(secs: u64) -> u64 {
    secs.clamp(MIN_SCAN_INTERVAL_SECS, MAX_SCAN_INTERVAL_SECS)
}

/// Whether `pattern` is safe to embed in a process query.
pub fn is_valid_process_pattern(pattern: &str) -> bool {
    !pattern.is_empty()
        && pattern.len() <= 64
        && pattern
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl EngineConfig {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` when given, otherwise defaults; then apply env overrides and validate.
    #[cfg(feature = "toml")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        }
        .with_runtime_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn with_runtime_overrides(mut self) -> Self {
        if let Ok(interval) = std::env::var("FUELWATCH_SCAN_INTERVAL") {
            if let Ok(parsed) = interval.trim().parse::<u64>() {
                self.scan_interval_secs = parsed;
            }
        }

        if let Ok(pattern) = std::env::var("FUELWATCH_PROCESS_PATTERN") {
            if !pattern.trim().is_empty() {
                self.process_pattern = pattern.trim().to_string();
            }
        }

        if let Ok(format) = std::env::var("FUELWATCH_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "pretty" | "text" => self.logging.format = LogFormat::Pretty,
                _ => {}
            }
        }

        if let Ok(level) = std::env::var("FUELWATCH_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.logging.level = level.trim().to_string();
            }
        }

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        if self.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }

        if !is_valid_process_pattern(&self.process_pattern) {
            return Err(ConfigError::ValidationError(format!(
                "process_pattern must be 1-64 characters of [A-Za-z0-9_.-] (got {:?})",
                self.process_pattern
            )));
        }

        Ok(())
    }

    /// Scan interval after clamping.
    pub fn effective_scan_interval(&self) -> u64 {
        normalize_scan_interval(self.scan_interval_secs)
    }
}

//! Engine and process configuration.
//!
//! # Responsibility
//! - Hold the tunables the recurrence engine reads (default hour, category).
//! - Load process configuration from TOML with defaults for every field.
//!
//! # Invariants
//! - A validated `EngineConfig` always yields a representable default time.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_START_HOUR: u32 = 19;
const DEFAULT_RECURRING_CATEGORY: &str = "recurring";
const DEFAULT_DATABASE_FILE: &str = "cadence.sqlite3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("default_start_hour must be within 0..=23, got {0}")]
    InvalidStartHour(u32),
    #[error("recurring_category must not be blank")]
    BlankCategory,
}

/// Tunables consumed by instance synthesis and virtual projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hour of day used for inflexible instances without a fixed start time.
    pub default_start_hour: u32,
    /// Category stamped on generated and virtual events.
    pub recurring_category: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_start_hour: DEFAULT_START_HOUR,
            recurring_category: DEFAULT_RECURRING_CATEGORY.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_start_hour > 23 {
            return Err(ConfigError::InvalidStartHour(self.default_start_hour));
        }
        if self.recurring_category.trim().is_empty() {
            return Err(ConfigError::BlankCategory);
        }
        Ok(())
    }

    /// Default time of day; falls back to 19:00 for an out-of-range hour.
    pub fn default_start_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.default_start_hour, 0, 0)
            .or_else(|| NaiveTime::from_hms_opt(DEFAULT_START_HOUR, 0, 0))
            .unwrap_or(NaiveTime::MIN)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`; build default when unset.
    pub level: Option<String>,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

/// Top-level process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub database_path: PathBuf,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CadenceConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.engine.validate()?;
        Ok(config)
    }
}

/// Reads and validates a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<CadenceConfig, ConfigError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    CadenceConfig::from_toml_str(&source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CadenceConfig::from_toml_str("").unwrap();
        assert_eq!(config, CadenceConfig::default());
        assert_eq!(
            config.engine.default_start_time(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap()
        );
        assert_eq!(config.engine.recurring_category, "recurring");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = CadenceConfig::from_toml_str(
            r#"
            database_path = "/var/lib/cadence/db.sqlite3"

            [engine]
            default_start_hour = 7

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.default_start_hour, 7);
        assert_eq!(config.engine.recurring_category, "recurring");
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.log_dir, None);
    }

    #[test]
    fn invalid_engine_values_are_rejected() {
        let err = CadenceConfig::from_toml_str("[engine]\ndefault_start_hour = 24").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStartHour(24)));

        let err = CadenceConfig::from_toml_str("[engine]\nrecurring_category = \" \"").unwrap_err();
        assert!(matches!(err, ConfigError::BlankCategory));
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config("/nonexistent/cadence.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::ControllerConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid workers: {0}. Must be between 1 and 64")]
    InvalidWorkers(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid analytics timeout: {0}. Must be positive")]
    InvalidAnalyticsTimeout(u64),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. canaryd.yaml (project config)
    /// 3. canaryd.local.yaml (local overrides, optional)
    /// 4. Environment variables (`CANARYD_*` prefix, highest priority)
    pub fn load() -> Result<ControllerConfig> {
        let config: ControllerConfig = Figment::new()
            .merge(Serialized::defaults(ControllerConfig::default()))
            .merge(Yaml::file("canaryd.yaml"))
            .merge(Yaml::file("canaryd.local.yaml"))
            .merge(Env::prefixed("CANARYD_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<ControllerConfig> {
        let config: ControllerConfig = Figment::new()
            .merge(Serialized::defaults(ControllerConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CANARYD_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &ControllerConfig) -> Result<(), ConfigError> {
        if config.workers == 0 || config.workers > 64 {
            return Err(ConfigError::InvalidWorkers(config.workers));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.analytics.timeout_secs == 0 {
            return Err(ConfigError::InvalidAnalyticsTimeout(
                config.analytics.timeout_secs,
            ));
        }

        if config.backoff.initial_backoff_ms >= config.backoff.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.backoff.initial_backoff_ms,
                config.backoff.max_backoff_ms,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ControllerConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ControllerConfig::default();
        config.workers = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidWorkers(0))
        ));

        let mut config = ControllerConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let mut config = ControllerConfig::default();
        config.backoff.initial_backoff_ms = 60_000;
        config.backoff.max_backoff_ms = 500;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(_, _))
        ));
    }

    #[test]
    fn test_load_from_file_merges_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers: 8").unwrap();
        writeln!(file, "logging:").unwrap();
        writeln!(file, "  level: debug").unwrap();
        writeln!(file, "  format: json").unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        // Untouched section keeps its default.
        assert_eq!(config.analytics.timeout_secs, 30);
    }

    #[test]
    fn test_env_overrides_file() {
        temp_env::with_var("CANARYD_WORKERS", Some("2"), || {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "workers: 8").unwrap();
            let config = ConfigLoader::load_from_file(file.path()).unwrap();
            assert_eq!(config.workers, 2);
        });
    }
}

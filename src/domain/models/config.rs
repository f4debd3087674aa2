//! Controller configuration model.
//!
//! Loaded by the figment-based loader with hierarchical merging; per-experiment
//! behavior always comes from the experiment record, never from configuration.

use serde::{Deserialize, Serialize};

/// Top-level controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Number of reconcile workers drawing from the work queue.
    pub workers: usize,
    pub logging: LoggingConfig,
    pub analytics: AnalyticsConfig,
    pub backoff: BackoffConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            logging: LoggingConfig::default(),
            analytics: AnalyticsConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset: trace, debug, info, warn, error.
    pub level: String,
    /// Stdout format: json or pretty.
    pub format: String,
    /// When set, logs are additionally written to daily-rolled files in this
    /// directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_dir: None,
        }
    }
}

/// Analytics HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Dispatcher backoff configuration for transient-error requeues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 60_000,
        }
    }
}

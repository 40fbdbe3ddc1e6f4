use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid {0}: must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("Invalid low_risk_auto_approve_threshold: {0}. Must be between 0 and 100")]
    InvalidThreshold(f64),

    #[error("Invalid {name}: {value}. Must be between 0 and 1")]
    InvalidRate { name: &'static str, value: f64 },

    #[error("Invalid default_target_percentage: {0}. Must be between 1 and 100")]
    InvalidTargetPercentage(u8),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .autopilot/config.yaml (project config, created by init)
    /// 3. .autopilot/local.yaml (project local overrides, optional)
    /// 4. Environment variables (AUTOPILOT_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".autopilot/config.yaml"))
            .merge(Yaml::file(".autopilot/local.yaml"))
            .merge(Env::prefixed("AUTOPILOT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let threshold = config.decision.low_risk_auto_approve_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }

        let intervals = [
            ("monitor.check_interval_secs", config.monitor.check_interval_secs),
            ("canary.poll_interval_secs", config.canary.poll_interval_secs),
            ("canary.discovery_interval_secs", config.canary.discovery_interval_secs),
            ("learning.interval_secs", config.learning.interval_secs),
            ("version_control.timeout_secs", config.version_control.timeout_secs),
            ("metrics.timeout_secs", config.metrics.timeout_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::ZeroInterval(*name));
        }
        if config.monitor.deployment_window_hours <= 0 {
            return Err(ConfigError::ZeroInterval("monitor.deployment_window_hours"));
        }
        if config.monitor.deployment_sample_size == 0 {
            return Err(ConfigError::ZeroInterval("monitor.deployment_sample_size"));
        }
        if config.canary.default_duration_minutes == 0 {
            return Err(ConfigError::ZeroInterval("canary.default_duration_minutes"));
        }
        if !(1..=100).contains(&config.canary.default_target_percentage) {
            return Err(ConfigError::InvalidTargetPercentage(
                config.canary.default_target_percentage,
            ));
        }

        let rates = [
            ("canary.max_error_rate", config.canary.max_error_rate),
            ("canary.min_success_rate", config.canary.min_success_rate),
            ("learning.success_pattern_rate", config.learning.success_pattern_rate),
            ("learning.failure_pattern_rate", config.learning.failure_pattern_rate),
            (
                "learning.auto_approve_suggestion_confidence",
                config.learning.auto_approve_suggestion_confidence,
            ),
            ("learning.caution_confidence", config.learning.caution_confidence),
        ];
        if let Some((name, value)) = rates.iter().find(|(_, v)| !(0.0..=1.0).contains(v)) {
            return Err(ConfigError::InvalidRate {
                name: *name,
                value: *value,
            });
        }

        if config.learning.min_samples == 0 {
            return Err(ConfigError::ValidationFailed(
                "learning.min_samples must be at least 1".to_string(),
            ));
        }
        if config.version_control.default_branch.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "version_control.default_branch cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

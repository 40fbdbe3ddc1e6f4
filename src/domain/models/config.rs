use serde::{Deserialize, Serialize};

use super::decision::OverridePolicy;
use super::proposal::RiskLevel;
use super::rollback::{CanaryRequest, SuccessCriteria};

/// Main configuration structure for autopilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Decision gate configuration
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Self-healing monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Canary supervision configuration
    #[serde(default)]
    pub canary: CanaryConfig,

    /// Learning engine configuration
    #[serde(default)]
    pub learning: LearningConfig,

    /// Version control collaborator configuration
    #[serde(default)]
    pub version_control: VersionControlConfig,

    /// Metrics collaborator configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".autopilot/autopilot.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// sqlx connection URL for the configured path.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            retention_days: default_retention_days(),
            log_dir: None,
        }
    }
}

/// Decision gate configuration.
///
/// Only the LOW risk auto-approval threshold is configurable. MEDIUM and
/// HIGH risk have no threshold at all, see [`DecisionConfig::auto_approve_threshold`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DecisionConfig {
    /// Minimum confidence (0-100) for a LOW risk proposal to auto-approve
    #[serde(default = "default_low_risk_threshold")]
    pub low_risk_auto_approve_threshold: f64,

    /// Operator override policy
    #[serde(default)]
    pub override_policy: OverridePolicy,
}

const fn default_low_risk_threshold() -> f64 {
    95.0
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            low_risk_auto_approve_threshold: default_low_risk_threshold(),
            override_policy: OverridePolicy::default(),
        }
    }
}

impl DecisionConfig {
    /// Confidence needed to auto-approve at `level`. `None` means never.
    pub fn auto_approve_threshold(&self, level: RiskLevel) -> Option<f64> {
        match level {
            RiskLevel::Low => Some(self.low_risk_auto_approve_threshold),
            RiskLevel::Medium | RiskLevel::High => None,
        }
    }
}

/// Self-healing monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// Seconds between health checks
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Failed proposals per hour that count as an error spike
    #[serde(default = "default_error_spike_threshold")]
    pub error_spike_threshold: u64,

    /// Average response time (ms) above which performance is degraded
    #[serde(default = "default_response_time_threshold_ms")]
    pub response_time_threshold_ms: f64,

    /// Lookback window for deployment health
    #[serde(default = "default_deployment_window_hours")]
    pub deployment_window_hours: i64,

    /// Number of most recent deployments inspected
    #[serde(default = "default_deployment_sample_size")]
    pub deployment_sample_size: u32,

    /// Window in which one issue id spawns at most one proposal
    #[serde(default = "default_auto_fix_dedup_window_secs")]
    pub auto_fix_dedup_window_secs: u64,

    /// Whether high/critical issues automatically spawn proposals
    #[serde(default = "default_true")]
    pub auto_fix_enabled: bool,
}

const fn default_check_interval_secs() -> u64 {
    60
}

const fn default_error_spike_threshold() -> u64 {
    10
}

const fn default_response_time_threshold_ms() -> f64 {
    2000.0
}

const fn default_deployment_window_hours() -> i64 {
    24
}

const fn default_deployment_sample_size() -> u32 {
    10
}

const fn default_auto_fix_dedup_window_secs() -> u64 {
    3600
}

const fn default_true() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            error_spike_threshold: default_error_spike_threshold(),
            response_time_threshold_ms: default_response_time_threshold_ms(),
            deployment_window_hours: default_deployment_window_hours(),
            deployment_sample_size: default_deployment_sample_size(),
            auto_fix_dedup_window_secs: default_auto_fix_dedup_window_secs(),
            auto_fix_enabled: default_true(),
        }
    }
}

/// Canary supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CanaryConfig {
    /// Seconds between evaluations of one canary
    #[serde(default = "default_canary_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds between scans of the store for new canaries
    #[serde(default = "default_canary_discovery_interval_secs")]
    pub discovery_interval_secs: u64,

    /// Roll back automatically when a canary breaches its criteria
    #[serde(default = "default_true")]
    pub auto_rollback: bool,

    #[serde(default = "default_target_percentage")]
    pub default_target_percentage: u8,

    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: u32,

    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,

    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
}

const fn default_canary_poll_interval_secs() -> u64 {
    30
}

const fn default_canary_discovery_interval_secs() -> u64 {
    60
}

const fn default_target_percentage() -> u8 {
    10
}

const fn default_duration_minutes() -> u32 {
    30
}

const fn default_max_error_rate() -> f64 {
    0.05
}

const fn default_min_success_rate() -> f64 {
    0.95
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_canary_poll_interval_secs(),
            discovery_interval_secs: default_canary_discovery_interval_secs(),
            auto_rollback: default_true(),
            default_target_percentage: default_target_percentage(),
            default_duration_minutes: default_duration_minutes(),
            max_error_rate: default_max_error_rate(),
            min_success_rate: default_min_success_rate(),
        }
    }
}

impl CanaryConfig {
    /// Canary request built from the configured defaults.
    pub fn default_request(&self) -> CanaryRequest {
        CanaryRequest {
            target_percentage: self.default_target_percentage,
            duration_minutes: self.default_duration_minutes,
            success_criteria: SuccessCriteria {
                max_error_rate: self.max_error_rate,
                min_success_rate: self.min_success_rate,
            },
        }
    }
}

/// Learning engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LearningConfig {
    /// Seconds between background learning runs
    #[serde(default = "default_learning_interval_secs")]
    pub interval_secs: u64,

    /// Minimum samples per subject before a pattern is reported
    #[serde(default = "default_min_samples")]
    pub min_samples: u32,

    /// Success rate above which a success pattern is reported
    #[serde(default = "default_success_pattern_rate")]
    pub success_pattern_rate: f64,

    /// Failure rate above which a failure pattern is reported
    #[serde(default = "default_failure_pattern_rate")]
    pub failure_pattern_rate: f64,

    /// Confidence above which a success pattern suggests auto-approval
    #[serde(default = "default_auto_approve_suggestion_confidence")]
    pub auto_approve_suggestion_confidence: f64,

    /// Confidence at which a failure pattern produces a caution
    #[serde(default = "default_caution_confidence")]
    pub caution_confidence: f64,
}

const fn default_learning_interval_secs() -> u64 {
    3600
}

const fn default_min_samples() -> u32 {
    3
}

const fn default_success_pattern_rate() -> f64 {
    0.8
}

const fn default_failure_pattern_rate() -> f64 {
    0.5
}

const fn default_auto_approve_suggestion_confidence() -> f64 {
    0.8
}

const fn default_caution_confidence() -> f64 {
    0.5
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_learning_interval_secs(),
            min_samples: default_min_samples(),
            success_pattern_rate: default_success_pattern_rate(),
            failure_pattern_rate: default_failure_pattern_rate(),
            auto_approve_suggestion_confidence: default_auto_approve_suggestion_confidence(),
            caution_confidence: default_caution_confidence(),
        }
    }
}

/// Version control collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VersionControlConfig {
    /// REST API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Repository owner
    #[serde(default)]
    pub owner: String,

    /// Repository name
    #[serde(default)]
    pub repo: String,

    /// Branch reverts are cut from and merged into
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Timeout applied to every collaborator call
    #[serde(default = "default_vcs_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

const fn default_vcs_timeout_secs() -> u64 {
    30
}

impl Default for VersionControlConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            owner: String::new(),
            repo: String::new(),
            default_branch: default_branch(),
            timeout_secs: default_vcs_timeout_secs(),
        }
    }
}

impl VersionControlConfig {
    pub fn is_configured(&self) -> bool {
        !self.owner.is_empty() && !self.repo.is_empty()
    }
}

/// Metrics collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    /// Base URL of the metrics service (static metrics when unset)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_metrics_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_metrics_timeout_secs() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_metrics_timeout_secs(),
        }
    }
}

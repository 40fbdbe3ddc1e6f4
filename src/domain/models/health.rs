//! Health issues reported by the self-healing monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proposal::RiskLevel;

/// Severity of a detected issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical issues spawn an auto-healing proposal.
    pub fn triggers_auto_fix(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Risk level pre-seeded on auto-healing proposals.
    pub fn seeded_risk_level(&self) -> RiskLevel {
        match self {
            Self::High | Self::Critical => RiskLevel::High,
            Self::Low | Self::Medium => RiskLevel::Medium,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of problem was detected, with the measurements behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthIssueKind {
    ErrorSpike {
        failure_count: u64,
        threshold: u64,
    },
    PerformanceDegradation {
        avg_response_time_ms: f64,
        threshold_ms: f64,
    },
    DeploymentHealth {
        total_deployments: u32,
        failed_deployments: u32,
        failure_rate: f64,
    },
    /// The health check machinery itself failed.
    MonitorFailure { errors: Vec<String> },
}

impl HealthIssueKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ErrorSpike { .. } => "error_spike",
            Self::PerformanceDegradation { .. } => "performance_degradation",
            Self::DeploymentHealth { .. } => "deployment_health",
            Self::MonitorFailure { .. } => "monitor_failure",
        }
    }
}

/// A single detected problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthIssue {
    /// Stable identifier, used to deduplicate auto-fix proposals.
    pub id: String,
    pub severity: Severity,
    pub kind: HealthIssueKind,
    pub description: String,
    pub suggested_action: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Result of one health check run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// True when no issue is above `low` severity.
    pub healthy: bool,
    pub issues: Vec<HealthIssue>,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn from_issues(issues: Vec<HealthIssue>, timestamp: DateTime<Utc>) -> Self {
        let healthy = issues.iter().all(|i| i.severity == Severity::Low);
        Self {
            healthy,
            issues,
            timestamp,
        }
    }
}

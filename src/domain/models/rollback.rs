//! Rollback and canary deployment models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackMethod {
    GitRevert,
    Manual,
}

/// Why an automated rollback did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RollbackFailure {
    /// The proposal has no pull request to revert.
    NoPullRequest,
    /// The pull request could not be read.
    PullRequestLookupFailed(String),
    /// The pull request exists but was never merged.
    PullRequestNotMerged,
    /// The proposal is not in a state that can be reverted.
    NotEligible(String),
    /// The proposal was already reverted.
    AlreadyRolledBack,
    RevertBranchFailed(String),
    RevertCommitFailed(String),
    RevertPullRequestFailed(String),
    RevertMergeFailed(String),
}

impl RollbackFailure {
    pub fn message(&self) -> String {
        match self {
            Self::NoPullRequest => "No PR to revert: proposal has no pull request number".to_string(),
            Self::PullRequestLookupFailed(e) => format!("Could not read PR to revert: {e}"),
            Self::PullRequestNotMerged => {
                "PR was not merged or merge commit not found".to_string()
            }
            Self::NotEligible(status) => {
                format!("Proposal in status {status} cannot be rolled back")
            }
            Self::AlreadyRolledBack => "Proposal was already rolled back".to_string(),
            Self::RevertBranchFailed(e) => format!("Revert branch creation failed: {e}"),
            Self::RevertCommitFailed(e) => format!("Revert commit failed: {e}"),
            Self::RevertPullRequestFailed(e) => format!("Revert PR creation failed: {e}"),
            Self::RevertMergeFailed(e) => format!("Revert PR could not be merged: {e}"),
        }
    }

    /// Whether this failure left the proposal needing a human.
    pub fn requires_manual_intervention(&self) -> bool {
        !matches!(self, Self::AlreadyRolledBack | Self::NotEligible(_))
    }
}

/// Outcome of a rollback attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub proposal_id: Uuid,
    pub method: RollbackMethod,
    pub message: String,
    pub failure: Option<RollbackFailure>,
    pub revert_pr_number: Option<u64>,
    pub revert_commit_sha: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RollbackResult {
    pub fn reverted(proposal_id: Uuid, pr_number: u64, sha: String) -> Self {
        Self {
            success: true,
            proposal_id,
            method: RollbackMethod::GitRevert,
            message: format!("Successfully reverted changes via PR #{pr_number}"),
            failure: None,
            revert_pr_number: Some(pr_number),
            revert_commit_sha: Some(sha),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(proposal_id: Uuid, failure: RollbackFailure) -> Self {
        let method = if failure.requires_manual_intervention() {
            RollbackMethod::Manual
        } else {
            RollbackMethod::GitRevert
        };
        let mut message = failure.message();
        if failure.requires_manual_intervention() {
            message.push_str(". Manual intervention required.");
        }
        Self {
            success: false,
            proposal_id,
            method,
            message,
            failure: Some(failure),
            revert_pr_number: None,
            revert_commit_sha: None,
            timestamp: Utc::now(),
        }
    }
}

/// Health thresholds a canary must respect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriteria {
    pub max_error_rate: f64,
    pub min_success_rate: f64,
}

/// Request to start a canary rollout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanaryRequest {
    /// Share of traffic (1-100).
    pub target_percentage: u8,
    pub duration_minutes: u32,
    pub success_criteria: SuccessCriteria,
}

impl CanaryRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.target_percentage == 0 || self.target_percentage > 100 {
            return Err(DomainError::ValidationFailed(format!(
                "target_percentage must be between 1 and 100, got {}",
                self.target_percentage
            )));
        }
        if self.duration_minutes == 0 {
            return Err(DomainError::ValidationFailed(
                "duration_minutes must be positive".to_string(),
            ));
        }
        let SuccessCriteria {
            max_error_rate,
            min_success_rate,
        } = self.success_criteria;
        if !(0.0..=1.0).contains(&max_error_rate) || !(0.0..=1.0).contains(&min_success_rate) {
            return Err(DomainError::ValidationFailed(
                "success criteria rates must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A running canary recorded on its proposal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanaryDeployment {
    pub target_percentage: u8,
    pub duration_minutes: u32,
    pub success_criteria: SuccessCriteria,
    pub started_at: DateTime<Utc>,
}

impl CanaryDeployment {
    pub fn start(request: CanaryRequest, now: DateTime<Utc>) -> Self {
        Self {
            target_percentage: request.target_percentage,
            duration_minutes: request.duration_minutes,
            success_criteria: request.success_criteria,
            started_at: now,
        }
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.started_at + Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// Live metrics for a canary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanaryMetrics {
    pub error_rate: f64,
    pub success_rate: f64,
    pub sample_size: u64,
}

/// Verdict of one canary evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanaryEvaluation {
    pub proposal_id: Uuid,
    pub should_proceed: bool,
    pub reason: String,
    pub metrics: Option<CanaryMetrics>,
    /// The observation window has fully elapsed.
    pub window_elapsed: bool,
    pub evaluated_at: DateTime<Utc>,
}

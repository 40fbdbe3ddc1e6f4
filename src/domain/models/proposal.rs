//! Improvement proposal domain model.
//!
//! A proposal is a candidate self-modification tracked from creation to a
//! terminal outcome. Status changes go through [`ImprovementProposal::transition`]
//! so that every caller shares the same lifecycle rules.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

use super::assessment::{ConfidenceScoringResult, RiskAnalysisResult};
use super::health::{HealthIssueKind, Severity};
use super::rollback::CanaryDeployment;

/// Why a proposal was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    RoutineAudit,
    MinorFeedback,
    PerformanceIssue,
    NonCriticalError,
    CriticalError,
    SecurityVulnerability,
    AutoHealing,
    /// Any value this build does not recognise. Scored as mid-range risk.
    #[serde(other)]
    Unknown,
}

impl TriggerType {
    pub const ALL: [TriggerType; 7] = [
        Self::RoutineAudit,
        Self::MinorFeedback,
        Self::PerformanceIssue,
        Self::NonCriticalError,
        Self::CriticalError,
        Self::SecurityVulnerability,
        Self::AutoHealing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoutineAudit => "routine_audit",
            Self::MinorFeedback => "minor_feedback",
            Self::PerformanceIssue => "performance_issue",
            Self::NonCriticalError => "non_critical_error",
            Self::CriticalError => "critical_error",
            Self::SecurityVulnerability => "security_vulnerability",
            Self::AutoHealing => "auto_healing",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a trigger name. Unrecognised names map to [`TriggerType::Unknown`].
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "routine_audit" => Self::RoutineAudit,
            "minor_feedback" => Self::MinorFeedback,
            "performance_issue" => Self::PerformanceIssue,
            "non_critical_error" => Self::NonCriticalError,
            "critical_error" => Self::CriticalError,
            "security_vulnerability" => Self::SecurityVulnerability,
            "auto_healing" => Self::AutoHealing,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse risk classification gating autonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Map a 0-100 risk score onto a level (thresholds 30 / 60).
    pub fn from_score(score: f64) -> Self {
        if score < 30.0 {
            Self::Low
        } else if score < 60.0 {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// Lifecycle status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Planned,
    PendingReview,
    Approved,
    Rejected,
    Merged,
    CanaryDeployment,
    Deployed,
    RollingBack,
    RolledBack,
    Failed,
}

impl Default for ProposalStatus {
    fn default() -> Self {
        Self::Planned
    }
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Merged => "merged",
            Self::CanaryDeployment => "canary_deployment",
            Self::Deployed => "deployed",
            Self::RollingBack => "rolling_back",
            Self::RolledBack => "rolled_back",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "planned" => Some(Self::Planned),
            "pending_review" => Some(Self::PendingReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "merged" => Some(Self::Merged),
            "canary_deployment" => Some(Self::CanaryDeployment),
            "deployed" => Some(Self::Deployed),
            "rolling_back" => Some(Self::RollingBack),
            "rolled_back" => Some(Self::RolledBack),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::RolledBack | Self::Failed)
    }

    /// Statuses that still await a decision.
    pub fn is_undecided(&self) -> bool {
        matches!(self, Self::Planned | Self::PendingReview)
    }

    /// Statuses the learning engine treats as a concluded lifecycle.
    pub fn is_concluded(&self) -> bool {
        matches!(
            self,
            Self::Approved
                | Self::Merged
                | Self::Deployed
                | Self::Rejected
                | Self::Failed
                | Self::RolledBack
        )
    }

    /// Whether the merged change is live in some form and can be reverted.
    pub fn is_revertible(&self) -> bool {
        matches!(self, Self::Merged | Self::CanaryDeployment | Self::Deployed)
    }

    pub fn can_transition_to(&self, to: ProposalStatus) -> bool {
        use ProposalStatus::{
            Approved, CanaryDeployment, Deployed, Failed, Merged, PendingReview, Planned,
            Rejected, RolledBack, RollingBack,
        };
        match (self, to) {
            (Planned | PendingReview, Approved | PendingReview | Rejected) => true,
            (Approved, Merged) => true,
            (Merged, CanaryDeployment | Deployed) => true,
            (CanaryDeployment, Deployed) => true,
            (Merged | CanaryDeployment | Deployed, RollingBack) => true,
            (RollingBack, RolledBack) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final classification stamped on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalOutcome {
    Success,
    Failure,
    AutoApproved,
    RolledBack,
    RollbackFailed,
}

impl ProposalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::AutoApproved => "auto_approved",
            Self::RolledBack => "rolled_back",
            Self::RollbackFailed => "rollback_failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "auto_approved" => Some(Self::AutoApproved),
            "rolled_back" => Some(Self::RolledBack),
            "rollback_failed" => Some(Self::RollbackFailed),
            _ => None,
        }
    }

    /// Outcomes that count against a deployment.
    pub fn is_deployment_failure(&self) -> bool {
        matches!(self, Self::Failure | Self::RolledBack | Self::RollbackFailed)
    }
}

/// Typed context describing what raised the proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TriggerContext {
    /// Raised by an operator or an external system.
    External { requested_by: Option<String> },
    /// Raised by the self-healing monitor for a detected health issue.
    AutoHealing {
        issue_id: String,
        kind: HealthIssueKind,
        severity: Severity,
        description: String,
    },
}

impl Default for TriggerContext {
    fn default() -> Self {
        Self::External { requested_by: None }
    }
}

/// Static-analysis signals reported alongside a candidate change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeQualityMetrics {
    pub lint_passed: bool,
    pub type_check_passed: bool,
    pub security_scan_passed: bool,
}

/// Input for creating a proposal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProposal {
    pub trigger_type: Option<TriggerType>,
    #[serde(default)]
    pub trigger_context: TriggerContext,
    pub problem_statement: String,
    #[serde(default)]
    pub solution_approach: String,
    #[serde(default)]
    pub files_changed: BTreeSet<String>,
    #[serde(default)]
    pub lines_changed: u32,
    #[serde(default)]
    pub affected_modules: BTreeSet<String>,
    pub test_coverage: Option<f64>,
    pub llm_confidence: Option<f64>,
    pub code_quality: Option<CodeQualityMetrics>,
    pub branch_name: Option<String>,
    /// Risk level known before scoring (auto-healing seeds this from issue severity).
    pub seeded_risk_level: Option<RiskLevel>,
}

/// Revision of the change content of an existing proposal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalRevision {
    pub solution_approach: Option<String>,
    pub files_changed: Option<BTreeSet<String>>,
    pub lines_changed: Option<u32>,
    pub affected_modules: Option<BTreeSet<String>>,
    pub test_coverage: Option<f64>,
    pub llm_confidence: Option<f64>,
    pub code_quality: Option<CodeQualityMetrics>,
}

/// A candidate self-modification tracked end-to-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementProposal {
    pub id: Uuid,
    pub trigger_type: TriggerType,
    pub trigger_context: TriggerContext,
    pub problem_statement: String,
    pub solution_approach: String,
    pub files_changed: BTreeSet<String>,
    pub lines_changed: u32,
    pub affected_modules: BTreeSet<String>,
    /// Measured or predicted test coverage (0-100).
    pub test_coverage: Option<f64>,
    /// Self-reported confidence of the generator (0-1).
    pub llm_confidence: Option<f64>,
    pub code_quality: Option<CodeQualityMetrics>,
    pub risk_level: Option<RiskLevel>,
    pub risk_score: Option<u8>,
    pub confidence_score: Option<u8>,
    pub risk_analysis: Option<RiskAnalysisResult>,
    pub confidence_scoring: Option<ConfidenceScoringResult>,
    pub status: ProposalStatus,
    pub outcome: Option<ProposalOutcome>,
    pub branch_name: Option<String>,
    pub pr_number: Option<u64>,
    pub merge_commit_sha: Option<String>,
    pub canary: Option<CanaryDeployment>,
    /// Bumped whenever the change content is revised.
    pub revision: u32,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deployed_at: Option<DateTime<Utc>>,
}

fn validate_unit_range(name: &str, value: Option<f64>, max: f64) -> DomainResult<()> {
    match value {
        Some(v) if !(0.0..=max).contains(&v) || v.is_nan() => Err(DomainError::ValidationFailed(
            format!("{name} must be between 0 and {max}, got {v}"),
        )),
        _ => Ok(()),
    }
}

fn validate_names(kind: &str, names: &BTreeSet<String>) -> DomainResult<()> {
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(DomainError::ValidationFailed(format!(
            "{kind} entries cannot be blank"
        )));
    }
    Ok(())
}

impl NewProposal {
    pub fn validate(&self) -> DomainResult<()> {
        if self.trigger_type.is_none() {
            return Err(DomainError::ValidationFailed(
                "trigger_type is required".to_string(),
            ));
        }
        if self.problem_statement.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "problem_statement cannot be empty".to_string(),
            ));
        }
        validate_names("files_changed", &self.files_changed)?;
        validate_names("affected_modules", &self.affected_modules)?;
        validate_unit_range("test_coverage", self.test_coverage, 100.0)?;
        validate_unit_range("llm_confidence", self.llm_confidence, 1.0)?;
        Ok(())
    }
}

impl ImprovementProposal {
    /// Create a planned proposal from validated input, created at `now`.
    pub fn new(input: NewProposal, now: DateTime<Utc>) -> DomainResult<Self> {
        input.validate()?;
        let id = Uuid::new_v4();
        let branch_name = input
            .branch_name
            .unwrap_or_else(|| Self::branch_name_for(id));
        Ok(Self {
            id,
            trigger_type: input.trigger_type.unwrap_or(TriggerType::Unknown),
            trigger_context: input.trigger_context,
            problem_statement: input.problem_statement,
            solution_approach: input.solution_approach,
            files_changed: input.files_changed,
            lines_changed: input.lines_changed,
            affected_modules: input.affected_modules,
            test_coverage: input.test_coverage,
            llm_confidence: input.llm_confidence,
            code_quality: input.code_quality,
            risk_level: input.seeded_risk_level,
            risk_score: None,
            confidence_score: None,
            risk_analysis: None,
            confidence_scoring: None,
            status: ProposalStatus::Planned,
            outcome: None,
            branch_name: Some(branch_name),
            pr_number: None,
            merge_commit_sha: None,
            canary: None,
            revision: 1,
            version: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            deployed_at: None,
        })
    }

    /// Default branch name for a proposal.
    pub fn branch_name_for(id: Uuid) -> String {
        format!("autopilot/proposal-{}", &id.to_string()[..8])
    }

    /// Re-check the scoring inputs stored on the proposal.
    pub fn validate_inputs(&self) -> DomainResult<()> {
        validate_names("files_changed", &self.files_changed)?;
        validate_names("affected_modules", &self.affected_modules)?;
        validate_unit_range("test_coverage", self.test_coverage, 100.0)?;
        validate_unit_range("llm_confidence", self.llm_confidence, 1.0)?;
        Ok(())
    }

    /// Move to `to`, stamping lifecycle timestamps with `now`.
    pub fn transition(&mut self, to: ProposalStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
                reason: format!("proposal {} does not allow this move", self.id),
            });
        }
        match to {
            ProposalStatus::CanaryDeployment | ProposalStatus::Deployed => {
                if self.deployed_at.is_none() || to == ProposalStatus::Deployed {
                    self.deployed_at = Some(now);
                }
            }
            _ => {}
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Mark the start of evaluation (first scoring run).
    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Replace the change content, invalidating previous scoring results.
    pub fn revise(&mut self, revision: ProposalRevision, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.is_undecided() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: self.status.to_string(),
                reason: "only undecided proposals can be revised".to_string(),
            });
        }
        if let Some(solution) = revision.solution_approach {
            self.solution_approach = solution;
        }
        if let Some(files) = revision.files_changed {
            self.files_changed = files;
        }
        if let Some(lines) = revision.lines_changed {
            self.lines_changed = lines;
        }
        if let Some(modules) = revision.affected_modules {
            self.affected_modules = modules;
        }
        if revision.test_coverage.is_some() {
            self.test_coverage = revision.test_coverage;
        }
        if revision.llm_confidence.is_some() {
            self.llm_confidence = revision.llm_confidence;
        }
        if revision.code_quality.is_some() {
            self.code_quality = revision.code_quality;
        }
        self.validate_inputs()?;

        self.revision += 1;
        self.risk_analysis = None;
        self.confidence_scoring = None;
        self.risk_score = None;
        self.confidence_score = None;
        self.updated_at = now;
        Ok(())
    }

    /// Attach a fresh risk result. Results are replaced, never patched.
    pub fn attach_risk(&mut self, result: RiskAnalysisResult, now: DateTime<Utc>) {
        self.risk_level = Some(result.risk_level);
        self.risk_score = Some(result.risk_score);
        self.risk_analysis = Some(result);
        self.updated_at = now;
    }

    /// Attach a fresh confidence result.
    pub fn attach_confidence(&mut self, result: ConfidenceScoringResult, now: DateTime<Utc>) {
        self.confidence_score = Some(result.confidence_score);
        self.confidence_scoring = Some(result);
        self.updated_at = now;
    }

    /// Whether the proposal counts as a historical success.
    pub fn is_success(&self) -> bool {
        match self.status {
            ProposalStatus::Deployed | ProposalStatus::Merged => true,
            ProposalStatus::Approved => self.outcome == Some(ProposalOutcome::Success),
            _ => false,
        }
    }

    /// Whether the proposal counts as a historical failure.
    pub fn is_failure(&self) -> bool {
        match self.status {
            ProposalStatus::Failed | ProposalStatus::RolledBack => true,
            ProposalStatus::Rejected => self.outcome == Some(ProposalOutcome::Failure),
            _ => false,
        }
    }

    /// Short label used in revert titles and logs.
    pub fn short_title(&self) -> String {
        self.problem_statement.chars().take(50).collect()
    }
}

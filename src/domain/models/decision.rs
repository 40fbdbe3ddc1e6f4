//! Decision models: the three-way gate and the override policy it consults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::proposal::{RiskLevel, TriggerType};

/// Action chosen by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    AutoApprove,
    HumanReview,
    Reject,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoApprove => "AUTO_APPROVE",
            Self::HumanReview => "HUMAN_REVIEW",
            Self::Reject => "REJECT",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "AUTO_APPROVE" => Some(Self::AutoApprove),
            "HUMAN_REVIEW" => Some(Self::HumanReview),
            "REJECT" => Some(Self::Reject),
            _ => None,
        }
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The checks evaluated while deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyChecks {
    pub override_requires_review: bool,
    pub confidence_acceptable: bool,
    pub risk_is_low: bool,
    pub confidence_meets_threshold: bool,
    pub override_permits_auto_approve: bool,
}

/// A recorded decision for a proposal revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub proposal_revision: u32,
    pub action: DecisionAction,
    pub reasoning: String,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub confidence_score: u8,
    pub safety_checks: SafetyChecks,
    /// Only the latest decision for a proposal is active.
    pub active: bool,
    pub decided_at: DateTime<Utc>,
}

/// Operator policy consulted before any autonomous approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OverridePolicy {
    /// Route every proposal to a human.
    #[serde(default)]
    pub require_human_review: bool,
    /// Master switch for autonomous approval.
    #[serde(default = "default_true")]
    pub allow_auto_approve: bool,
    /// Triggers that always need a human.
    #[serde(default)]
    pub review_required_triggers: Vec<TriggerType>,
    /// Modules whose changes always need a human.
    #[serde(default)]
    pub review_required_modules: Vec<String>,
}

const fn default_true() -> bool {
    true
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self {
            require_human_review: false,
            allow_auto_approve: true,
            review_required_triggers: vec![],
            review_required_modules: vec![],
        }
    }
}

impl OverridePolicy {
    /// Returns the reason human review is mandated, if it is.
    pub fn mandated_review_reason<'a, I>(&self, trigger: TriggerType, modules: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        if self.require_human_review {
            return Some("override policy requires human review for all proposals".to_string());
        }
        if self.review_required_triggers.contains(&trigger) {
            return Some(format!(
                "override policy requires human review for trigger {trigger}"
            ));
        }
        modules
            .into_iter()
            .find(|m| {
                self.review_required_modules
                    .iter()
                    .any(|r| r.eq_ignore_ascii_case(m))
            })
            .map(|m| format!("override policy requires human review for module {m}"))
    }
}

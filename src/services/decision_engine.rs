//! Three-way decision gate: auto-approve, human review or reject.
//!
//! Rules, in priority order:
//! 1. an override policy mandating review wins;
//! 2. a `reject` confidence recommendation rejects, whatever the risk;
//! 3. auto-approval needs LOW risk, a confidence at or above the LOW
//!    threshold and a policy that permits it;
//! 4. everything else goes to a human.
//!
//! MEDIUM and HIGH risk have no auto-approval threshold at all
//! ([`DecisionConfig::auto_approve_threshold`] returns `None`), so no
//! configuration can let them bypass review.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::models::{
    ConfidenceScoringResult, DecisionAction, DecisionConfig, DecisionResult, Recommendation,
    RiskAnalysisResult, RiskLevel, SafetyChecks, TriggerType,
};

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: DecisionConfig,
}

/// What the engine needs to know about the proposal being decided.
#[derive(Debug, Clone, Copy)]
pub struct DecisionSubject<'a> {
    pub proposal_id: Uuid,
    pub revision: u32,
    pub trigger_type: TriggerType,
    pub affected_modules: &'a BTreeSet<String>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    #[instrument(skip_all, fields(proposal_id = %subject.proposal_id, risk_level = %risk.risk_level))]
    pub fn decide(
        &self,
        subject: DecisionSubject<'_>,
        risk: &RiskAnalysisResult,
        confidence: &ConfidenceScoringResult,
    ) -> DecisionResult {
        let policy = &self.config.override_policy;
        let mandated = policy.mandated_review_reason(subject.trigger_type, subject.affected_modules);

        let score = f64::from(confidence.confidence_score);
        let threshold = self.config.auto_approve_threshold(risk.risk_level);
        let checks = SafetyChecks {
            override_requires_review: mandated.is_some(),
            confidence_acceptable: confidence.recommendation != Recommendation::Reject,
            risk_is_low: risk.risk_level == RiskLevel::Low,
            confidence_meets_threshold: threshold.is_some_and(|t| score >= t),
            override_permits_auto_approve: policy.allow_auto_approve,
        };

        let (action, reasoning) = if let Some(reason) = mandated {
            (
                DecisionAction::HumanReview,
                format!("Human review required: {reason}."),
            )
        } else if !checks.confidence_acceptable {
            (
                DecisionAction::Reject,
                format!(
                    "Rejected: confidence score {}% is below the acceptable minimum. {}",
                    confidence.confidence_score, confidence.reasoning
                ),
            )
        } else if checks.risk_is_low
            && checks.confidence_meets_threshold
            && checks.override_permits_auto_approve
        {
            (
                DecisionAction::AutoApprove,
                format!(
                    "Auto-approved: risk is LOW (score {}) and confidence {}% meets the {}% threshold.",
                    risk.risk_score,
                    confidence.confidence_score,
                    self.config.low_risk_auto_approve_threshold
                ),
            )
        } else {
            (
                DecisionAction::HumanReview,
                self.review_reason(risk, confidence, &checks),
            )
        };

        tracing::info!(action = %action, "decision made");

        DecisionResult {
            id: Uuid::new_v4(),
            proposal_id: subject.proposal_id,
            proposal_revision: subject.revision,
            action,
            reasoning,
            risk_level: risk.risk_level,
            risk_score: risk.risk_score,
            confidence_score: confidence.confidence_score,
            safety_checks: checks,
            active: true,
            decided_at: Utc::now(),
        }
    }

    fn review_reason(
        &self,
        risk: &RiskAnalysisResult,
        confidence: &ConfidenceScoringResult,
        checks: &SafetyChecks,
    ) -> String {
        if !checks.risk_is_low {
            format!(
                "Human review required: risk level is {} (score {}); only LOW risk proposals may be auto-approved.",
                risk.risk_level, risk.risk_score
            )
        } else if !checks.confidence_meets_threshold {
            format!(
                "Human review required: confidence {}% is below the {}% auto-approval threshold for LOW risk.",
                confidence.confidence_score, self.config.low_risk_auto_approve_threshold
            )
        } else {
            "Human review required: override policy does not permit auto-approval.".to_string()
        }
    }
}

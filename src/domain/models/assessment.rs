//! Risk and confidence assessment models.
//!
//! Results are immutable snapshots: re-scoring a proposal produces a new
//! result that replaces the previous one wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proposal::{CodeQualityMetrics, ImprovementProposal, RiskLevel, TriggerType};

/// Outcome history for proposals similar to the one being scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    /// Number of concluded proposals considered similar.
    pub similar_count: u32,
    /// Share of those that succeeded (0-1).
    pub success_rate: f64,
}

/// Input to the risk analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysisInput {
    pub trigger_type: TriggerType,
    pub files_changed: Vec<String>,
    pub lines_changed: u32,
    pub affected_modules: Vec<String>,
    pub test_coverage: Option<f64>,
    pub historical_data: Option<HistoricalData>,
}

impl RiskAnalysisInput {
    pub fn from_proposal(proposal: &ImprovementProposal, history: Option<HistoricalData>) -> Self {
        Self {
            trigger_type: proposal.trigger_type,
            files_changed: proposal.files_changed.iter().cloned().collect(),
            lines_changed: proposal.lines_changed,
            affected_modules: proposal.affected_modules.iter().cloned().collect(),
            test_coverage: proposal.test_coverage,
            historical_data: history,
        }
    }
}

/// Rounded sub-scores behind a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub trigger_risk: u8,
    pub complexity_risk: u8,
    pub impact_risk: u8,
    pub historical_risk: u8,
}

/// Result of a risk analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysisResult {
    pub risk_level: RiskLevel,
    /// 0-100, higher means more dangerous.
    pub risk_score: u8,
    pub factors: RiskFactors,
    pub reasoning: String,
    /// Proposal revision the result was computed for (0 when standalone).
    #[serde(default)]
    pub revision: u32,
    pub computed_at: DateTime<Utc>,
}

impl RiskAnalysisResult {
    /// Copy of this result bound to a proposal revision.
    pub fn for_revision(self, revision: u32) -> Self {
        Self { revision, ..self }
    }
}

/// Input to the confidence scorer. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScoringInput {
    /// Generator self-reported confidence (0-1).
    pub llm_confidence: Option<f64>,
    /// Predicted test coverage (0-100).
    pub predicted_test_coverage: Option<f64>,
    pub historical_data: Option<HistoricalData>,
    pub code_quality: Option<CodeQualityMetrics>,
}

impl ConfidenceScoringInput {
    pub fn from_proposal(proposal: &ImprovementProposal, history: Option<HistoricalData>) -> Self {
        Self {
            llm_confidence: proposal.llm_confidence,
            predicted_test_coverage: proposal.test_coverage,
            historical_data: history,
            code_quality: proposal.code_quality,
        }
    }
}

/// Rounded sub-scores behind a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub llm_confidence: u8,
    pub test_coverage: u8,
    pub historical_success: u8,
    pub code_quality: u8,
}

/// What the confidence score alone would recommend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    AutoApprove,
    HumanReview,
    Reject,
}

impl Recommendation {
    /// Map a 0-100 confidence score (thresholds 90 / 60).
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::AutoApprove
        } else if score >= 60.0 {
            Self::HumanReview
        } else {
            Self::Reject
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoApprove => "auto_approve",
            Self::HumanReview => "human_review",
            Self::Reject => "reject",
        }
    }
}

/// Result of confidence scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScoringResult {
    /// 0-100, higher means more likely to succeed.
    pub confidence_score: u8,
    pub factors: ConfidenceFactors,
    pub recommendation: Recommendation,
    pub reasoning: String,
    #[serde(default)]
    pub revision: u32,
    pub computed_at: DateTime<Utc>,
}

impl ConfidenceScoringResult {
    pub fn for_revision(self, revision: u32) -> Self {
        Self { revision, ..self }
    }
}

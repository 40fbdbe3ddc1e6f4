//! Confidence scoring: how likely a proposed change is to succeed.

use chrono::Utc;
use tracing::instrument;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CodeQualityMetrics, ConfidenceFactors, ConfidenceScoringInput, ConfidenceScoringResult,
    HistoricalData, Recommendation,
};
use crate::services::risk_analyzer::{round_score, validate_history};

const LLM_WEIGHT: f64 = 0.30;
const COVERAGE_WEIGHT: f64 = 0.25;
const HISTORY_WEIGHT: f64 = 0.25;
const QUALITY_WEIGHT: f64 = 0.20;

// Sub-scores used when the input is absent. Never 0 or 100.
const DEFAULT_LLM: f64 = 60.0;
const DEFAULT_COVERAGE: f64 = 50.0;
const DEFAULT_HISTORY: f64 = 60.0;
const DEFAULT_QUALITY: f64 = 60.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, input))]
    pub fn score(&self, input: &ConfidenceScoringInput) -> DomainResult<ConfidenceScoringResult> {
        validate(input)?;

        let llm = llm_score(input.llm_confidence);
        let coverage = coverage_score(input.predicted_test_coverage);
        let history = history_score(input.historical_data);
        let quality = quality_score(input.code_quality);

        let raw = llm * LLM_WEIGHT
            + coverage * COVERAGE_WEIGHT
            + history * HISTORY_WEIGHT
            + quality * QUALITY_WEIGHT;
        let confidence_score = round_score(raw);
        let recommendation = Recommendation::from_score(f64::from(confidence_score));

        tracing::debug!(
            confidence_score,
            recommendation = recommendation.as_str(),
            "confidence scored"
        );

        Ok(ConfidenceScoringResult {
            confidence_score,
            factors: ConfidenceFactors {
                llm_confidence: round_score(llm),
                test_coverage: round_score(coverage),
                historical_success: round_score(history),
                code_quality: round_score(quality),
            },
            recommendation,
            reasoning: reasoning(confidence_score, llm, coverage, history, quality),
            revision: 0,
            computed_at: Utc::now(),
        })
    }
}

fn validate(input: &ConfidenceScoringInput) -> DomainResult<()> {
    if let Some(c) = input.llm_confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(DomainError::ValidationFailed(format!(
                "llm_confidence must be between 0 and 1, got {c}"
            )));
        }
    }
    if let Some(c) = input.predicted_test_coverage {
        if !(0.0..=100.0).contains(&c) {
            return Err(DomainError::ValidationFailed(format!(
                "predicted_test_coverage must be between 0 and 100, got {c}"
            )));
        }
    }
    validate_history(input.historical_data)
}

pub fn llm_score(llm_confidence: Option<f64>) -> f64 {
    llm_confidence.map_or(DEFAULT_LLM, |c| c * 100.0)
}

pub fn coverage_score(coverage: Option<f64>) -> f64 {
    coverage.unwrap_or(DEFAULT_COVERAGE)
}

/// Historical success, blended toward the default when samples are few.
pub fn history_score(history: Option<HistoricalData>) -> f64 {
    match history {
        None => DEFAULT_HISTORY,
        Some(h) if h.similar_count == 0 => DEFAULT_HISTORY,
        Some(h) => {
            let base = h.success_rate * 100.0;
            match h.similar_count {
                1..=2 => (base + DEFAULT_HISTORY) / 2.0,
                3..=9 => base * 0.7 + DEFAULT_HISTORY * 0.3,
                _ => base,
            }
        }
    }
}

pub fn quality_score(quality: Option<CodeQualityMetrics>) -> f64 {
    let Some(q) = quality else {
        return DEFAULT_QUALITY;
    };
    let mut score = 0.0;
    if q.lint_passed {
        score += 30.0;
    }
    if q.type_check_passed {
        score += 40.0;
    }
    if q.security_scan_passed {
        score += 30.0;
    }
    score
}

fn reasoning(score: u8, llm: f64, coverage: f64, history: f64, quality: f64) -> String {
    let mut strengths = Vec::new();
    let mut concerns = Vec::new();

    let checks = [
        (llm, "high LLM confidence", "low LLM confidence"),
        (coverage, "excellent test coverage", "insufficient test coverage"),
        (history, "strong historical success rate", "poor historical success rate"),
        (quality, "high code quality", "code quality concerns"),
    ];
    for (value, strength, concern) in checks {
        if value > 80.0 {
            strengths.push(strength);
        } else if value < 50.0 {
            concerns.push(concern);
        }
    }

    let mut text = format!("Confidence score: {score}%. ");
    if !strengths.is_empty() {
        text.push_str(&format!("Strengths: {}. ", strengths.join(", ")));
    }
    if !concerns.is_empty() {
        text.push_str(&format!("Concerns: {}. ", concerns.join(", ")));
    }
    text.push_str(match Recommendation::from_score(f64::from(score)) {
        Recommendation::AutoApprove => "Recommended for auto-approval.",
        Recommendation::HumanReview => "Recommended for human review.",
        Recommendation::Reject => "Not recommended for implementation.",
    });
    text
}

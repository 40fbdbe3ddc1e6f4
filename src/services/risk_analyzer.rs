//! Risk analysis for improvement proposals.
//!
//! Four sub-scores (trigger, complexity, impact, history) are combined with
//! fixed weights into a 0-100 risk score. Deterministic, no side effects.

use chrono::Utc;
use tracing::instrument;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    HistoricalData, RiskAnalysisInput, RiskAnalysisResult, RiskFactors, RiskLevel, TriggerType,
};

const TRIGGER_WEIGHT: f64 = 0.30;
const COMPLEXITY_WEIGHT: f64 = 0.25;
const IMPACT_WEIGHT: f64 = 0.30;
const HISTORICAL_WEIGHT: f64 = 0.15;

/// Modules whose modification always raises impact.
pub const CRITICAL_MODULES: [&str; 5] = ["auth", "database", "api", "consciousness", "self-improvement"];

/// Neutral historical risk when there is no usable history.
const NEUTRAL_HISTORICAL_RISK: f64 = 50.0;

/// Below this many samples history is regressed toward neutral.
const SPARSE_HISTORY: u32 = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAnalyzer;

impl RiskAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Score how dangerous a proposed change is.
    ///
    /// Fails only on malformed input (blank names, out-of-range history).
    #[instrument(skip(self, input), fields(trigger_type = %input.trigger_type))]
    pub fn analyze(&self, input: &RiskAnalysisInput) -> DomainResult<RiskAnalysisResult> {
        validate(input)?;

        let trigger = trigger_risk(input.trigger_type);
        let complexity = complexity_risk(input.lines_changed);
        let impact = impact_risk(&input.affected_modules, &input.files_changed);
        let historical = historical_risk(input.historical_data);

        let raw = trigger * TRIGGER_WEIGHT
            + complexity * COMPLEXITY_WEIGHT
            + impact * IMPACT_WEIGHT
            + historical * HISTORICAL_WEIGHT;
        let risk_score = round_score(raw);
        // Level comes from the reported score so the two never disagree.
        let risk_level = RiskLevel::from_score(f64::from(risk_score));

        let factors = RiskFactors {
            trigger_risk: round_score(trigger),
            complexity_risk: round_score(complexity),
            impact_risk: round_score(impact),
            historical_risk: round_score(historical),
        };
        let reasoning = reasoning(risk_level, trigger, complexity, impact, historical);

        tracing::debug!(risk_score, risk_level = %risk_level, "risk analysed");

        Ok(RiskAnalysisResult {
            risk_level,
            risk_score,
            factors,
            reasoning,
            revision: 0,
            computed_at: Utc::now(),
        })
    }
}

fn validate(input: &RiskAnalysisInput) -> DomainResult<()> {
    if input.affected_modules.iter().any(|m| m.trim().is_empty()) {
        return Err(DomainError::ValidationFailed(
            "affected_modules entries cannot be blank".to_string(),
        ));
    }
    if input.files_changed.iter().any(|f| f.trim().is_empty()) {
        return Err(DomainError::ValidationFailed(
            "files_changed entries cannot be blank".to_string(),
        ));
    }
    validate_history(input.historical_data)
}

pub(crate) fn validate_history(history: Option<HistoricalData>) -> DomainResult<()> {
    match history {
        Some(h) if !(0.0..=1.0).contains(&h.success_rate) => Err(DomainError::ValidationFailed(
            format!("historical success_rate must be between 0 and 1, got {}", h.success_rate),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn round_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// Base risk per trigger. Anything unrecognised is mid-range.
pub fn trigger_risk(trigger: TriggerType) -> f64 {
    match trigger {
        TriggerType::RoutineAudit => 10.0,
        TriggerType::MinorFeedback => 15.0,
        TriggerType::PerformanceIssue => 40.0,
        TriggerType::NonCriticalError => 50.0,
        TriggerType::CriticalError => 80.0,
        TriggerType::SecurityVulnerability => 95.0,
        TriggerType::AutoHealing | TriggerType::Unknown => 50.0,
    }
}

pub fn complexity_risk(lines_changed: u32) -> f64 {
    match lines_changed {
        0..=49 => 10.0,
        50..=99 => 25.0,
        100..=199 => 50.0,
        200..=499 => 70.0,
        _ => 90.0,
    }
}

pub fn is_critical_module(module: &str) -> bool {
    let module = module.trim().to_lowercase();
    CRITICAL_MODULES.contains(&module.as_str())
}

/// Files that change the persisted schema.
pub fn is_schema_migration(path: &str) -> bool {
    let path = path.to_lowercase();
    path.contains("schema.prisma")
        || path.ends_with(".sql")
        || path.split('/').any(|segment| segment == "migrations")
}

pub fn impact_risk(affected_modules: &[String], files_changed: &[String]) -> f64 {
    let mut risk = 0.0;

    if affected_modules.iter().any(|m| is_critical_module(m)) {
        risk += 40.0;
    }

    risk += match affected_modules.len() {
        1 => 10.0,
        0 | 2 | 3 => 30.0,
        _ => 60.0,
    };

    if files_changed.iter().any(|f| is_schema_migration(f)) {
        risk += 30.0;
    }

    f64::min(risk, 100.0)
}

pub fn historical_risk(history: Option<HistoricalData>) -> f64 {
    match history {
        None => NEUTRAL_HISTORICAL_RISK,
        Some(h) if h.similar_count == 0 => NEUTRAL_HISTORICAL_RISK,
        Some(h) => {
            let risk = (1.0 - h.success_rate) * 100.0;
            if h.similar_count < SPARSE_HISTORY {
                (risk + NEUTRAL_HISTORICAL_RISK) / 2.0
            } else {
                risk
            }
        }
    }
}

fn reasoning(level: RiskLevel, trigger: f64, complexity: f64, impact: f64, historical: f64) -> String {
    let mut reasons: Vec<&str> = Vec::new();

    if trigger > 70.0 {
        reasons.push("triggered by a critical issue");
    } else if trigger < 20.0 {
        reasons.push("triggered by routine maintenance");
    }

    if complexity > 70.0 {
        reasons.push("involves significant code changes");
    } else if complexity < 30.0 {
        reasons.push("involves minimal code changes");
    }

    if impact > 70.0 {
        reasons.push("affects critical system components");
    } else if impact < 30.0 {
        reasons.push("affects isolated, non-critical components");
    }

    if historical > 70.0 {
        reasons.push("similar improvements have had low success rates");
    } else if historical < 30.0 {
        reasons.push("similar improvements have been successful");
    }

    let reason_text = if reasons.is_empty() {
        "standard risk factors".to_string()
    } else {
        reasons.join(", ")
    };

    format!("Risk level assessed as {level} because this improvement is {reason_text}.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input(trigger: TriggerType, lines: u32, modules: &[&str]) -> RiskAnalysisInput {
        RiskAnalysisInput {
            trigger_type: trigger,
            files_changed: vec![],
            lines_changed: lines,
            affected_modules: modules.iter().map(|m| m.to_string()).collect(),
            test_coverage: None,
            historical_data: None,
        }
    }

    #[test]
    fn test_routine_docs_change_is_low_risk() {
        let result = RiskAnalyzer::new()
            .analyze(&input(TriggerType::RoutineAudit, 20, &["docs"]))
            .unwrap();
        // 10*.3 + 10*.25 + 10*.3 + 50*.15 = 16
        assert_eq!(result.risk_score, 16);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.reasoning.contains("routine maintenance"));
        assert!(result.reasoning.starts_with("Risk level assessed as LOW"));
    }

    #[test]
    fn test_large_security_change_to_critical_modules_is_high_risk() {
        let result = RiskAnalyzer::new()
            .analyze(&input(TriggerType::SecurityVulnerability, 600, &["auth", "database"]))
            .unwrap();
        // 95*.3 + 90*.25 + 70*.3 + 50*.15 = 79.5
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.factors.impact_risk, 70);
        assert!(result.reasoning.contains("critical issue"));
        assert!(result.reasoning.contains("significant code changes"));
    }

    #[test]
    fn test_unknown_trigger_is_mid_range() {
        assert_eq!(trigger_risk(TriggerType::Unknown), 50.0);
        assert_eq!(trigger_risk(TriggerType::AutoHealing), 50.0);
    }

    #[test]
    fn test_complexity_bands() {
        assert_eq!(complexity_risk(0), 10.0);
        assert_eq!(complexity_risk(49), 10.0);
        assert_eq!(complexity_risk(50), 25.0);
        assert_eq!(complexity_risk(199), 50.0);
        assert_eq!(complexity_risk(499), 70.0);
        assert_eq!(complexity_risk(500), 90.0);
    }

    #[test]
    fn test_impact_counts_critical_modules_and_schema_changes() {
        let modules = vec!["API".to_string()];
        let files = vec!["prisma/schema.prisma".to_string()];
        assert_eq!(impact_risk(&modules, &files), 80.0);

        let many: Vec<String> = (0..5).map(|i| format!("m{i}")).collect();
        assert_eq!(impact_risk(&many, &[]), 60.0);
        assert_eq!(impact_risk(&[], &[]), 30.0);

        let capped = vec!["auth".to_string(), "a".into(), "b".into(), "c".into()];
        let sql = vec!["migrations/002_add.sql".to_string()];
        assert_eq!(impact_risk(&capped, &sql), 100.0);
    }

    #[test]
    fn test_sparse_history_regresses_to_neutral() {
        let sparse = HistoricalData {
            similar_count: 2,
            success_rate: 0.0,
        };
        assert_eq!(historical_risk(Some(sparse)), 75.0);

        let solid = HistoricalData {
            similar_count: 8,
            success_rate: 0.9,
        };
        assert!((historical_risk(Some(solid)) - 10.0).abs() < 1e-9);

        let empty = HistoricalData {
            similar_count: 0,
            success_rate: 0.0,
        };
        assert_eq!(historical_risk(Some(empty)), 50.0);
    }

    #[test]
    fn test_rejects_invalid_history_and_blank_modules() {
        let mut bad = input(TriggerType::MinorFeedback, 10, &["ui"]);
        bad.historical_data = Some(HistoricalData {
            similar_count: 4,
            success_rate: 1.3,
        });
        assert!(matches!(
            RiskAnalyzer::new().analyze(&bad),
            Err(DomainError::ValidationFailed(_))
        ));

        let blank = input(TriggerType::MinorFeedback, 10, &["  "]);
        assert!(RiskAnalyzer::new().analyze(&blank).is_err());
    }

    fn trigger_strategy() -> impl Strategy<Value = TriggerType> {
        prop_oneof![
            Just(TriggerType::RoutineAudit),
            Just(TriggerType::MinorFeedback),
            Just(TriggerType::PerformanceIssue),
            Just(TriggerType::NonCriticalError),
            Just(TriggerType::CriticalError),
            Just(TriggerType::SecurityVulnerability),
            Just(TriggerType::AutoHealing),
            Just(TriggerType::Unknown),
        ]
    }

    proptest! {
        #[test]
        fn prop_score_in_range_and_level_matches_thresholds(
            trigger in trigger_strategy(),
            lines in 0u32..5_000,
            modules in proptest::collection::vec("[a-z]{1,8}", 0..6),
            history in proptest::option::of((0u32..50, 0.0f64..=1.0)),
        ) {
            let input = RiskAnalysisInput {
                trigger_type: trigger,
                files_changed: vec![],
                lines_changed: lines,
                affected_modules: modules,
                test_coverage: None,
                historical_data: history.map(|(similar_count, success_rate)| HistoricalData {
                    similar_count,
                    success_rate,
                }),
            };
            let result = RiskAnalyzer::new().analyze(&input).unwrap();
            prop_assert!(result.risk_score <= 100);
            let expected = if result.risk_score < 30 {
                RiskLevel::Low
            } else if result.risk_score < 60 {
                RiskLevel::Medium
            } else {
                RiskLevel::High
            };
            prop_assert_eq!(result.risk_level, expected);
        }

        #[test]
        fn prop_more_lines_never_lowers_risk(
            trigger in trigger_strategy(),
            lines in 0u32..2_000,
            extra in 0u32..2_000,
        ) {
            let analyzer = RiskAnalyzer::new();
            let small = analyzer.analyze(&input(trigger, lines, &["ui"])).unwrap();
            let large = analyzer.analyze(&input(trigger, lines + extra, &["ui"])).unwrap();
            prop_assert!(large.risk_score >= small.risk_score);
        }
    }
}

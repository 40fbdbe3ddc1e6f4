//! Advisory aggregates mined from historical proposals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proposal::TriggerType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Success,
    Failure,
}

/// What a pattern groups proposals by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum PatternSubject {
    TriggerType(TriggerType),
    Module(String),
}

impl std::fmt::Display for PatternSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TriggerType(t) => write!(f, "trigger \"{t}\""),
            Self::Module(m) => write!(f, "module \"{m}\""),
        }
    }
}

/// A success or failure tendency for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub kind: PatternKind,
    pub subject: PatternSubject,
    pub description: String,
    /// Grows with sample size, capped by `occurrences / 10`.
    pub confidence: f64,
    /// Total concluded proposals for the subject.
    pub occurrences: u32,
    /// Proposals that matched the pattern kind.
    pub matching: u32,
    /// `matching / occurrences`.
    pub rate: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub total_improvements: u32,
    pub success_rate: f64,
    pub auto_approval_rate: f64,
    pub average_confidence_score: f64,
}

/// Output of a learning run. Never authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningInsight {
    pub patterns: Vec<Pattern>,
    pub recommendations: Vec<String>,
    pub metrics: LearningMetrics,
}

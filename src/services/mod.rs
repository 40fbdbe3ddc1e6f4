//! Service layer: scoring, deciding, reverting, monitoring and learning.

pub mod confidence_scorer;
pub mod decision_engine;
pub mod evaluation_pipeline;
pub mod historical_outcomes;
pub mod learning_engine;
pub mod proposal_updates;
pub mod risk_analyzer;
pub mod rollback_manager;
pub mod scheduler;
pub mod self_healing;

pub use confidence_scorer::ConfidenceScorer;
pub use decision_engine::{DecisionEngine, DecisionSubject};
pub use evaluation_pipeline::{Evaluation, EvaluationPipeline};
pub use historical_outcomes::HistoricalOutcomes;
pub use learning_engine::LearningEngine;
pub use proposal_updates::modify_proposal;
pub use risk_analyzer::RiskAnalyzer;
pub use rollback_manager::RollbackManager;
pub use scheduler::{AutonomyScheduler, SchedulerSettings};
pub use self_healing::{HealthCycleReport, SelfHealingMonitor};

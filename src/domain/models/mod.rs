pub mod assessment;
pub mod config;
pub mod decision;
pub mod health;
pub mod learning;
pub mod proposal;
pub mod rollback;

pub use assessment::{
    ConfidenceFactors, ConfidenceScoringInput, ConfidenceScoringResult, HistoricalData,
    Recommendation, RiskAnalysisInput, RiskAnalysisResult, RiskFactors,
};
pub use config::{
    CanaryConfig, Config, DatabaseConfig, DecisionConfig, LearningConfig, LoggingConfig,
    MetricsConfig, MonitorConfig, VersionControlConfig,
};
pub use decision::{DecisionAction, DecisionResult, OverridePolicy, SafetyChecks};
pub use health::{HealthCheckResult, HealthIssue, HealthIssueKind, Severity};
pub use learning::{LearningInsight, LearningMetrics, Pattern, PatternKind, PatternSubject};
pub use proposal::{
    CodeQualityMetrics, ImprovementProposal, NewProposal, ProposalOutcome, ProposalRevision,
    ProposalStatus, RiskLevel, TriggerContext, TriggerType,
};
pub use rollback::{
    CanaryDeployment, CanaryEvaluation, CanaryMetrics, CanaryRequest, RollbackFailure,
    RollbackMethod, RollbackResult, SuccessCriteria,
};

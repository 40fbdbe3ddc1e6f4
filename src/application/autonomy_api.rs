//! Operations exposed to callers: one method per endpoint of the external
//! service surface, plus the proposal lifecycle around them.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use uuid::Uuid;

use crate::application::context::AppContext;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CanaryConfig, CanaryEvaluation, CanaryRequest, ConfidenceScoringResult, DecisionResult,
    ImprovementProposal, LearningInsight, NewProposal, ProposalOutcome, ProposalRevision,
    ProposalStatus, RiskAnalysisResult, RollbackResult,
};
use crate::domain::ports::{Clock, ProposalFilter, ProposalRepository};
use crate::services::{
    modify_proposal, AutonomyScheduler, DecisionEngine, Evaluation, EvaluationPipeline,
    HealthCycleReport, LearningEngine, RollbackManager, SchedulerSettings, SelfHealingMonitor,
};

/// Facade over the decision pipeline.
pub struct AutonomyApi {
    repository: Arc<dyn ProposalRepository>,
    pipeline: EvaluationPipeline,
    rollback: Arc<RollbackManager>,
    monitor: Arc<SelfHealingMonitor>,
    learning: Arc<LearningEngine>,
    canary_defaults: CanaryConfig,
    scheduler_settings: SchedulerSettings,
    clock: Arc<dyn Clock>,
}

impl AutonomyApi {
    pub fn new(ctx: &AppContext) -> Self {
        let config = &ctx.config;
        let vcs_timeout = Duration::from_secs(config.version_control.timeout_secs);
        let default_branch = config.version_control.default_branch.clone();

        let rollback = RollbackManager::new(
            ctx.repository.clone(),
            ctx.vcs.clone(),
            ctx.metrics.clone(),
            ctx.clock.clone(),
            default_branch.clone(),
            vcs_timeout,
        );
        let monitor = SelfHealingMonitor::new(
            ctx.repository.clone(),
            ctx.metrics.clone(),
            ctx.clock.clone(),
            config.monitor.clone(),
        )
        .with_version_control(ctx.vcs.clone(), default_branch, vcs_timeout);

        Self {
            repository: ctx.repository.clone(),
            pipeline: EvaluationPipeline::new(
                ctx.repository.clone(),
                DecisionEngine::new(config.decision.clone()),
                ctx.clock.clone(),
            ),
            rollback: Arc::new(rollback),
            monitor: Arc::new(monitor),
            learning: Arc::new(LearningEngine::new(
                ctx.repository.clone(),
                config.learning.clone(),
            )),
            canary_defaults: config.canary.clone(),
            scheduler_settings: SchedulerSettings::from_config(config),
            clock: ctx.clock.clone(),
        }
    }

    /// Background loops sharing this facade's services.
    pub fn scheduler(&self) -> AutonomyScheduler {
        AutonomyScheduler::new(
            self.repository.clone(),
            self.monitor.clone(),
            self.rollback.clone(),
            self.learning.clone(),
            self.scheduler_settings,
        )
    }

    // Endpoint operations.

    pub async fn analyze_risk(&self, id: Uuid) -> DomainResult<RiskAnalysisResult> {
        self.pipeline.analyze_risk(id).await
    }

    pub async fn score_confidence(&self, id: Uuid) -> DomainResult<ConfidenceScoringResult> {
        self.pipeline.score_confidence(id).await
    }

    /// Decide from previously stored risk and confidence results.
    pub async fn decide(&self, id: Uuid) -> DomainResult<Evaluation> {
        self.pipeline.decide(id).await
    }

    /// Score and decide in one pass.
    pub async fn evaluate(&self, id: Uuid) -> DomainResult<Evaluation> {
        self.pipeline.evaluate(id).await
    }

    pub async fn rollback(&self, id: Uuid) -> DomainResult<RollbackResult> {
        self.rollback.rollback(id).await
    }

    /// Start a canary, with the configured defaults when `request` is `None`.
    pub async fn start_canary(
        &self,
        id: Uuid,
        request: Option<CanaryRequest>,
    ) -> DomainResult<ImprovementProposal> {
        let request = request.unwrap_or_else(|| self.canary_defaults.default_request());
        self.rollback.start_canary(id, request).await
    }

    pub async fn canary_status(&self, id: Uuid) -> DomainResult<CanaryEvaluation> {
        self.rollback.monitor_canary(id).await
    }

    pub async fn promote_canary(&self, id: Uuid) -> DomainResult<ImprovementProposal> {
        self.rollback.promote_canary(id).await
    }

    /// Run the health checks, optionally raising auto-fix proposals
    /// regardless of `monitor.auto_fix_enabled`.
    pub async fn health_check(&self, auto_fix: bool) -> HealthCycleReport {
        let check = self.monitor.perform_health_check().await;
        let created = if auto_fix {
            self.monitor.fix_issues(&check).await
        } else {
            Vec::new()
        };
        HealthCycleReport { check, created }
    }

    pub async fn learning_patterns(&self) -> LearningInsight {
        self.learning.analyze_patterns().await
    }

    // Lifecycle operations.

    #[instrument(skip(self, input), fields(trigger_type = ?input.trigger_type))]
    pub async fn create_proposal(&self, input: NewProposal) -> DomainResult<ImprovementProposal> {
        let proposal = ImprovementProposal::new(input, self.clock.now())?;
        self.repository.create(&proposal).await?;
        tracing::info!(proposal_id = %proposal.id, "proposal created");
        Ok(proposal)
    }

    /// Replace the change content. Previous scoring results are discarded.
    #[instrument(skip(self, revision), fields(proposal_id = %id))]
    pub async fn revise_proposal(
        &self,
        id: Uuid,
        revision: ProposalRevision,
    ) -> DomainResult<ImprovementProposal> {
        let now = self.clock.now();
        let proposal =
            modify_proposal(self.repository.as_ref(), id, |p| p.revise(revision.clone(), now)).await?;
        tracing::info!(revision = proposal.revision, "proposal revised");
        Ok(proposal)
    }

    /// Operator approval of an undecided proposal.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn approve(&self, id: Uuid, reviewer: Option<&str>) -> DomainResult<ImprovementProposal> {
        let proposal = modify_proposal(self.repository.as_ref(), id, |p| {
            require_undecided(p, ProposalStatus::Approved)?;
            p.transition(ProposalStatus::Approved, self.clock.now())
        })
        .await?;
        tracing::info!(reviewer = reviewer.unwrap_or("operator"), "proposal approved by reviewer");
        Ok(proposal)
    }

    /// Operator rejection of an undecided proposal.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn reject(&self, id: Uuid, reviewer: Option<&str>) -> DomainResult<ImprovementProposal> {
        let proposal = modify_proposal(self.repository.as_ref(), id, |p| {
            require_undecided(p, ProposalStatus::Rejected)?;
            p.transition(ProposalStatus::Rejected, self.clock.now())
        })
        .await?;
        tracing::info!(reviewer = reviewer.unwrap_or("operator"), "proposal rejected by reviewer");
        Ok(proposal)
    }

    /// Record that the approved change was merged through `pr_number`.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn record_merge(
        &self,
        id: Uuid,
        pr_number: u64,
        merge_commit_sha: &str,
    ) -> DomainResult<ImprovementProposal> {
        if merge_commit_sha.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "merge_commit_sha cannot be empty".to_string(),
            ));
        }
        modify_proposal(self.repository.as_ref(), id, |p| {
            p.transition(ProposalStatus::Merged, self.clock.now())?;
            p.pr_number = Some(pr_number);
            p.merge_commit_sha = Some(merge_commit_sha.to_string());
            Ok(())
        })
        .await
    }

    /// Full deployment without a canary.
    pub async fn mark_deployed(&self, id: Uuid) -> DomainResult<ImprovementProposal> {
        modify_proposal(self.repository.as_ref(), id, |p| {
            if p.status != ProposalStatus::Merged {
                return Err(DomainError::InvalidStateTransition {
                    from: p.status.to_string(),
                    to: ProposalStatus::Deployed.to_string(),
                    reason: "only merged proposals can be deployed directly".to_string(),
                });
            }
            p.transition(ProposalStatus::Deployed, self.clock.now())
        })
        .await
    }

    /// Stamp the observed result of a shipped proposal.
    ///
    /// A failure moves the proposal to `failed`; it stays revertible
    /// history for the learning engine but is no longer live.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn record_outcome(&self, id: Uuid, success: bool) -> DomainResult<ImprovementProposal> {
        let proposal = modify_proposal(self.repository.as_ref(), id, |p| {
            if !matches!(
                p.status,
                ProposalStatus::Approved
                    | ProposalStatus::Merged
                    | ProposalStatus::CanaryDeployment
                    | ProposalStatus::Deployed
            ) {
                return Err(DomainError::InvalidStateTransition {
                    from: p.status.to_string(),
                    to: p.status.to_string(),
                    reason: "outcomes are recorded for approved or shipped proposals only".to_string(),
                });
            }
            if success {
                p.outcome = Some(ProposalOutcome::Success);
            } else {
                p.transition(ProposalStatus::Failed, self.clock.now())?;
                p.outcome = Some(ProposalOutcome::Failure);
            }
            Ok(())
        })
        .await?;
        tracing::info!(success, status = %proposal.status, "outcome recorded");
        Ok(proposal)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<ImprovementProposal> {
        self.repository
            .get(id)
            .await?
            .ok_or(DomainError::ProposalNotFound(id))
    }

    pub async fn list(&self, filter: &ProposalFilter) -> DomainResult<Vec<ImprovementProposal>> {
        self.repository.list(filter).await
    }

    pub async fn decisions(&self, id: Uuid) -> DomainResult<Vec<DecisionResult>> {
        self.repository.decision_history(id).await
    }
}

fn require_undecided(p: &ImprovementProposal, to: ProposalStatus) -> DomainResult<()> {
    if p.status.is_undecided() {
        Ok(())
    } else {
        Err(DomainError::InvalidStateTransition {
            from: p.status.to_string(),
            to: to.to_string(),
            reason: "proposal has already been decided".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryProposalRepository;
    use crate::adapters::metrics::StaticMetricsSource;
    use crate::adapters::mock::MockVersionControl;
    use crate::domain::models::{Config, DecisionAction, TriggerType};
    use crate::domain::ports::{ManualClock, SystemClock};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::BTreeSet;

    fn api() -> (AutonomyApi, Arc<MockVersionControl>) {
        let vcs = Arc::new(MockVersionControl::new());
        let ctx = AppContext::from_parts(
            Config::default(),
            Arc::new(InMemoryProposalRepository::new()),
            vcs.clone(),
            Arc::new(StaticMetricsSource::new()),
            Arc::new(SystemClock),
        );
        (AutonomyApi::new(&ctx), vcs)
    }

    fn input() -> NewProposal {
        NewProposal {
            trigger_type: Some(TriggerType::PerformanceIssue),
            problem_statement: "Cache product lookups".to_string(),
            files_changed: BTreeSet::from(["src/catalog/cache.rs".to_string()]),
            lines_changed: 120,
            affected_modules: BTreeSet::from(["catalog".to_string()]),
            test_coverage: Some(70.0),
            llm_confidence: Some(0.8),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_operator_approval_then_ship() {
        let (api, _) = api();
        let p = api.create_proposal(input()).await.unwrap();

        let eval = api.evaluate(p.id).await.unwrap();
        assert_eq!(eval.decision.action, DecisionAction::HumanReview);

        api.approve(p.id, Some("dana")).await.unwrap();
        let merged = api.record_merge(p.id, 12, "abc123").await.unwrap();
        assert_eq!(merged.status, ProposalStatus::Merged);
        assert_eq!(merged.pr_number, Some(12));

        let deployed = api.mark_deployed(p.id).await.unwrap();
        assert!(deployed.deployed_at.is_some());

        let done = api.record_outcome(p.id, true).await.unwrap();
        assert_eq!(done.outcome, Some(ProposalOutcome::Success));
        assert!(done.is_success());
    }

    #[tokio::test]
    async fn test_cannot_approve_twice() {
        let (api, _) = api();
        let p = api.create_proposal(input()).await.unwrap();
        api.reject(p.id, None).await.unwrap();
        assert!(matches!(
            api.approve(p.id, None).await,
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_outcome_marks_failed() {
        let (api, _) = api();
        let p = api.create_proposal(input()).await.unwrap();
        api.approve(p.id, None).await.unwrap();
        api.record_merge(p.id, 3, "def456").await.unwrap();
        api.mark_deployed(p.id).await.unwrap();

        let failed = api.record_outcome(p.id, false).await.unwrap();
        assert_eq!(failed.status, ProposalStatus::Failed);
        assert!(failed.is_failure());
    }

    #[tokio::test]
    async fn test_canary_defaults_from_config() {
        let (api, _) = api();
        let p = api.create_proposal(input()).await.unwrap();
        api.approve(p.id, None).await.unwrap();
        api.record_merge(p.id, 4, "0a1b2c").await.unwrap();

        let canary = api.start_canary(p.id, None).await.unwrap();
        let deployment = canary.canary.unwrap();
        assert_eq!(deployment.target_percentage, 10);
        assert_eq!(deployment.duration_minutes, 30);

        let status = api.canary_status(p.id).await.unwrap();
        assert!(status.should_proceed);
        assert!(!status.window_elapsed);
    }

    #[tokio::test]
    async fn test_rollback_through_api() {
        let (api, vcs) = api();
        vcs.add_merged_pull_request(21, "feedbeef").await;
        let p = api.create_proposal(input()).await.unwrap();
        api.approve(p.id, None).await.unwrap();
        api.record_merge(p.id, 21, "feedbeef").await.unwrap();
        api.mark_deployed(p.id).await.unwrap();

        let result = api.rollback(p.id).await.unwrap();
        assert!(result.success, "{}", result.message);
        assert_eq!(api.get(p.id).await.unwrap().status, ProposalStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_revise_resets_scores() {
        let (api, _) = api();
        let p = api.create_proposal(input()).await.unwrap();
        api.analyze_risk(p.id).await.unwrap();

        let revised = api
            .revise_proposal(
                p.id,
                ProposalRevision {
                    lines_changed: Some(40),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(revised.revision, 2);
        assert!(revised.risk_analysis.is_none());
    }

    #[tokio::test]
    async fn test_quiet_health_check_creates_nothing() {
        let (api, _) = api();
        let report = api.health_check(true).await;
        assert!(report.check.healthy);
        assert!(report.created.is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_timestamps_follow_injected_clock() {
        let start = Utc::now() + ChronoDuration::days(30);
        let clock = Arc::new(ManualClock::new(start));
        let mut config = Config::default();
        config.monitor.error_spike_threshold = 0;
        let ctx = AppContext::from_parts(
            config,
            Arc::new(InMemoryProposalRepository::new()),
            Arc::new(MockVersionControl::new()),
            Arc::new(StaticMetricsSource::new()),
            clock.clone(),
        );
        let api = AutonomyApi::new(&ctx);

        let p = api.create_proposal(input()).await.unwrap();
        assert_eq!(p.created_at, start);

        clock.advance(ChronoDuration::minutes(10));
        api.approve(p.id, None).await.unwrap();
        api.record_merge(p.id, 5, "0ddba11").await.unwrap();
        let deployed = api.mark_deployed(p.id).await.unwrap();
        assert_eq!(deployed.deployed_at, Some(start + ChronoDuration::minutes(10)));

        let failed = api.record_outcome(p.id, false).await.unwrap();
        assert_eq!(failed.completed_at, Some(start + ChronoDuration::minutes(10)));

        // The monitor's window is measured on the same clock.
        let report = api.health_check(false).await;
        assert!(report
            .check
            .issues
            .iter()
            .any(|i| i.kind.label() == "error_spike"));
    }
}

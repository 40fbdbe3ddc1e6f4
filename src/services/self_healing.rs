//! Self-healing monitor.
//!
//! Three independent checks run against the proposal store and the metrics
//! source. A check that errors does not abort the others; its error is folded
//! into one synthetic critical issue. High and critical issues spawn a single
//! `auto_healing` proposal each, deduplicated per issue id.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    HealthCheckResult, HealthIssue, HealthIssueKind, ImprovementProposal, MonitorConfig,
    NewProposal, ProposalStatus, Severity, TriggerContext, TriggerType,
};
use crate::domain::ports::{
    Clock, FileChange, MetricsSource, ProposalFilter, ProposalRepository, VersionControl,
};
use crate::services::rollback_manager::bounded;

pub const ERROR_SPIKE_ID: &str = "error-spike";
pub const PERFORMANCE_ID: &str = "performance-degradation";
pub const DEPLOYMENT_HEALTH_ID: &str = "deployment-health";
pub const MONITOR_FAILURE_ID: &str = "health-check-failure";

/// Minimum deployments before the failure ratio means anything.
const MIN_DEPLOYMENT_SAMPLE: usize = 3;

/// Where auto-fix branches are published, when a version control
/// collaborator is attached.
struct BranchPublisher {
    vcs: Arc<dyn VersionControl>,
    base_branch: String,
    timeout: Duration,
}

/// What one monitoring cycle did.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthCycleReport {
    pub check: HealthCheckResult,
    /// Auto-fix proposals created this cycle.
    pub created: Vec<Uuid>,
}

pub struct SelfHealingMonitor {
    repository: Arc<dyn ProposalRepository>,
    metrics: Arc<dyn MetricsSource>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    publisher: Option<BranchPublisher>,
}

impl SelfHealingMonitor {
    pub fn new(
        repository: Arc<dyn ProposalRepository>,
        metrics: Arc<dyn MetricsSource>,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            repository,
            metrics,
            clock,
            config,
            publisher: None,
        }
    }

    /// Publish each auto-fix branch with a plan file.
    pub fn with_version_control(
        mut self,
        vcs: Arc<dyn VersionControl>,
        base_branch: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        self.publisher = Some(BranchPublisher {
            vcs,
            base_branch: base_branch.into(),
            timeout,
        });
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run every check. Never fails.
    #[instrument(skip(self))]
    pub async fn perform_health_check(&self) -> HealthCheckResult {
        let now = self.clock.now();
        let (spike, perf, deploys) = tokio::join!(
            self.check_error_spike(now),
            self.check_performance(now),
            self.check_deployment_health(now),
        );

        let mut issues = Vec::new();
        let mut errors = Vec::new();
        for (name, outcome) in [
            ("error spike", spike),
            ("performance", perf),
            ("deployment health", deploys),
        ] {
            match outcome {
                Ok(Some(issue)) => issues.push(issue),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(check = name, error = %e, "health check failed");
                    errors.push(format!("{name}: {e}"));
                }
            }
        }
        if !errors.is_empty() {
            issues.push(HealthIssue {
                id: MONITOR_FAILURE_ID.to_string(),
                severity: Severity::Critical,
                kind: HealthIssueKind::MonitorFailure { errors },
                description: "Health check system itself failed".to_string(),
                suggested_action: Some(
                    "Check proposal store and metrics source connectivity".to_string(),
                ),
                detected_at: now,
            });
        }

        let result = HealthCheckResult::from_issues(issues, now);
        tracing::info!(
            healthy = result.healthy,
            issues_found = result.issues.len(),
            "health check completed"
        );
        result
    }

    async fn check_error_spike(&self, now: DateTime<Utc>) -> DomainResult<Option<HealthIssue>> {
        let failures = self
            .repository
            .list(&ProposalFilter {
                statuses: vec![ProposalStatus::Failed],
                created_after: Some(now - ChronoDuration::hours(1)),
                ..Default::default()
            })
            .await?;

        let count = failures.len() as u64;
        let threshold = self.config.error_spike_threshold;
        if count <= threshold {
            return Ok(None);
        }
        let severity = if count > threshold.saturating_mul(2) {
            Severity::Critical
        } else {
            Severity::High
        };
        Ok(Some(HealthIssue {
            id: ERROR_SPIKE_ID.to_string(),
            severity,
            kind: HealthIssueKind::ErrorSpike {
                failure_count: count,
                threshold,
            },
            description: format!(
                "Detected {count} failed improvements in the last hour (threshold {threshold})"
            ),
            suggested_action: Some(
                "Investigate recent failures and consider rolling back recent changes".to_string(),
            ),
            detected_at: now,
        }))
    }

    async fn check_performance(&self, now: DateTime<Utc>) -> DomainResult<Option<HealthIssue>> {
        let avg = self.metrics.average_response_time_ms().await?;
        let threshold = self.config.response_time_threshold_ms;
        if avg <= threshold {
            return Ok(None);
        }
        let severity = if avg > threshold * 2.0 {
            Severity::High
        } else {
            Severity::Medium
        };
        Ok(Some(HealthIssue {
            id: PERFORMANCE_ID.to_string(),
            severity,
            kind: HealthIssueKind::PerformanceDegradation {
                avg_response_time_ms: avg,
                threshold_ms: threshold,
            },
            description: format!(
                "Average response time ({avg:.0}ms) exceeds threshold ({threshold:.0}ms)"
            ),
            suggested_action: Some(
                "Investigate slow queries and consider performance optimizations".to_string(),
            ),
            detected_at: now,
        }))
    }

    async fn check_deployment_health(
        &self,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<HealthIssue>> {
        let since = now - ChronoDuration::hours(self.config.deployment_window_hours);
        let recent = self
            .repository
            .list(&ProposalFilter::deployed_since(
                since,
                self.config.deployment_sample_size,
            ))
            .await?;

        if recent.len() < MIN_DEPLOYMENT_SAMPLE {
            return Ok(None);
        }
        let failed = recent
            .iter()
            .filter(|p| p.outcome.is_some_and(|o| o.is_deployment_failure()))
            .count();
        let rate = failed as f64 / recent.len() as f64;
        let severity = if rate > 0.5 {
            Severity::High
        } else if rate > 0.3 {
            Severity::Medium
        } else {
            return Ok(None);
        };

        Ok(Some(HealthIssue {
            id: DEPLOYMENT_HEALTH_ID.to_string(),
            severity,
            kind: HealthIssueKind::DeploymentHealth {
                total_deployments: recent.len() as u32,
                failed_deployments: failed as u32,
                failure_rate: rate,
            },
            description: format!(
                "High deployment failure rate: {}% of recent deployments failed",
                (rate * 100.0).round()
            ),
            suggested_action: Some(
                "Review deployment process and consider stricter approval criteria".to_string(),
            ),
            detected_at: now,
        }))
    }

    /// Create the auto-healing proposal for `issue`.
    ///
    /// Returns `None` when a proposal for the same issue id was already
    /// created inside the dedup window.
    #[instrument(skip(self, issue), fields(issue_id = %issue.id, severity = %issue.severity))]
    pub async fn trigger_auto_fix(
        &self,
        issue: &HealthIssue,
    ) -> DomainResult<Option<ImprovementProposal>> {
        let now = self.clock.now();
        if self.recently_fixed(&issue.id, now).await? {
            tracing::debug!("auto-fix already raised inside dedup window");
            return Ok(None);
        }

        let branch = format!("auto-fix/{}-{}", issue.id, now.timestamp_millis());
        let proposal = ImprovementProposal::new(
            NewProposal {
                trigger_type: Some(TriggerType::AutoHealing),
                trigger_context: TriggerContext::AutoHealing {
                    issue_id: issue.id.clone(),
                    kind: issue.kind.clone(),
                    severity: issue.severity,
                    description: issue.description.clone(),
                },
                problem_statement: format!("Auto-detected issue: {}", issue.description),
                solution_approach: issue
                    .suggested_action
                    .clone()
                    .unwrap_or_else(|| "Investigate and resolve the issue".to_string()),
                branch_name: Some(branch.clone()),
                seeded_risk_level: Some(issue.severity.seeded_risk_level()),
                ..Default::default()
            },
            now,
        )?;
        self.repository.create(&proposal).await?;
        tracing::info!(proposal_id = %proposal.id, branch = %branch, "auto-fix proposal created");

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publish_branch(publisher, &branch, &proposal, issue).await {
                tracing::warn!(proposal_id = %proposal.id, error = %e, "auto-fix branch not published");
            }
        }

        Ok(Some(proposal))
    }

    async fn recently_fixed(&self, issue_id: &str, now: DateTime<Utc>) -> DomainResult<bool> {
        let window = ChronoDuration::seconds(
            i64::try_from(self.config.auto_fix_dedup_window_secs).unwrap_or(i64::MAX / 1000),
        );
        let recent = self
            .repository
            .list(&ProposalFilter {
                trigger_type: Some(TriggerType::AutoHealing),
                created_after: Some(now - window),
                ..Default::default()
            })
            .await?;
        Ok(recent.iter().any(|p| {
            matches!(&p.trigger_context, TriggerContext::AutoHealing { issue_id: id, .. } if id == issue_id)
        }))
    }

    /// One monitoring tick: check, then raise auto-fixes for high and
    /// critical issues when enabled.
    pub async fn run_cycle(&self) -> HealthCycleReport {
        let check = self.perform_health_check().await;
        let created = if self.config.auto_fix_enabled {
            self.fix_issues(&check).await
        } else {
            Vec::new()
        };
        HealthCycleReport { check, created }
    }

    /// Raise auto-fix proposals for every high or critical issue in
    /// `check`. Returns the ids of proposals created.
    pub async fn fix_issues(&self, check: &HealthCheckResult) -> Vec<Uuid> {
        let mut created = Vec::new();
        for issue in check.issues.iter().filter(|i| i.severity.triggers_auto_fix()) {
            match self.trigger_auto_fix(issue).await {
                Ok(Some(p)) => created.push(p.id),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(issue_id = %issue.id, error = %e, "failed to trigger auto-fix");
                }
            }
        }
        created
    }
}

async fn publish_branch(
    publisher: &BranchPublisher,
    branch: &str,
    proposal: &ImprovementProposal,
    issue: &HealthIssue,
) -> DomainResult<()> {
    bounded(
        "create_branch",
        publisher.timeout,
        publisher.vcs.create_branch(branch, &publisher.base_branch),
    )
    .await?;

    let plan = FileChange {
        path: format!(".autopilot/auto-fix/{}.md", issue.id),
        content: format!(
            "# {}\n\nProposal: {}\nSeverity: {}\n\n## Problem\n\n{}\n\n## Approach\n\n{}\n",
            issue.id,
            proposal.id,
            issue.severity,
            proposal.problem_statement,
            proposal.solution_approach
        ),
    };
    bounded(
        "commit_files",
        publisher.timeout,
        publisher.vcs.commit_files(
            branch,
            std::slice::from_ref(&plan),
            &format!("Plan auto-fix for {}", issue.id),
        ),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryProposalRepository;
    use crate::adapters::metrics::StaticMetricsSource;
    use crate::adapters::mock::{MockVersionControl, VcsOperation};
    use crate::domain::models::{ProposalOutcome, RiskLevel};
    use crate::domain::ports::SystemClock;

    struct Harness {
        repo: Arc<InMemoryProposalRepository>,
        metrics: Arc<StaticMetricsSource>,
        monitor: SelfHealingMonitor,
    }

    fn harness(config: MonitorConfig) -> Harness {
        let repo = Arc::new(InMemoryProposalRepository::new());
        let metrics = Arc::new(StaticMetricsSource::new());
        let monitor = SelfHealingMonitor::new(
            repo.clone(),
            metrics.clone(),
            Arc::new(SystemClock),
            config,
        );
        Harness {
            repo,
            metrics,
            monitor,
        }
    }

    async fn seed(
        repo: &InMemoryProposalRepository,
        status: ProposalStatus,
        outcome: Option<ProposalOutcome>,
        deployed: bool,
    ) {
        let mut p = ImprovementProposal::new(
            NewProposal {
                trigger_type: Some(TriggerType::MinorFeedback),
                problem_statement: "seeded".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        p.status = status;
        p.outcome = outcome;
        if deployed {
            p.deployed_at = Some(Utc::now());
        }
        repo.create(&p).await.unwrap();
    }

    #[tokio::test]
    async fn test_quiet_system_is_healthy() {
        let h = harness(MonitorConfig::default());
        let result = h.monitor.perform_health_check().await;
        assert!(result.healthy);
        assert!(result.issues.is_empty());
    }

    #[tokio::test]
    async fn test_error_spike_severity_escalates() {
        let h = harness(MonitorConfig {
            error_spike_threshold: 2,
            ..Default::default()
        });
        for _ in 0..3 {
            seed(&h.repo, ProposalStatus::Failed, None, false).await;
        }
        let issue = h.monitor.perform_health_check().await.issues.remove(0);
        assert_eq!(issue.id, ERROR_SPIKE_ID);
        assert_eq!(issue.severity, Severity::High);

        for _ in 0..2 {
            seed(&h.repo, ProposalStatus::Failed, None, false).await;
        }
        let result = h.monitor.perform_health_check().await;
        assert_eq!(result.issues[0].severity, Severity::Critical);
        assert!(!result.healthy);
    }

    #[tokio::test]
    async fn test_performance_degradation() {
        let h = harness(MonitorConfig::default());
        h.metrics.set_response_time_ms(3_000.0).await;
        let issue = h.monitor.perform_health_check().await.issues.remove(0);
        assert_eq!(issue.id, PERFORMANCE_ID);
        assert_eq!(issue.severity, Severity::Medium);

        h.metrics.set_response_time_ms(4_500.0).await;
        let issue = h.monitor.perform_health_check().await.issues.remove(0);
        assert_eq!(issue.severity, Severity::High);
    }

    #[tokio::test]
    async fn test_deployment_health_needs_three_samples() {
        let h = harness(MonitorConfig::default());
        seed(&h.repo, ProposalStatus::RolledBack, Some(ProposalOutcome::RolledBack), true).await;
        seed(&h.repo, ProposalStatus::Failed, Some(ProposalOutcome::Failure), true).await;
        assert!(h.monitor.perform_health_check().await.healthy);

        seed(&h.repo, ProposalStatus::Deployed, Some(ProposalOutcome::Success), true).await;
        let issue = h.monitor.perform_health_check().await.issues.remove(0);
        assert_eq!(issue.id, DEPLOYMENT_HEALTH_ID);
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(
            issue.description,
            "High deployment failure rate: 67% of recent deployments failed"
        );
    }

    #[tokio::test]
    async fn test_failing_check_becomes_critical_issue() {
        let h = harness(MonitorConfig::default());
        h.metrics.set_failure(Some("scrape timeout")).await;
        let result = h.monitor.perform_health_check().await;
        assert!(!result.healthy);
        let issue = &result.issues[0];
        assert_eq!(issue.id, MONITOR_FAILURE_ID);
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.description, "Health check system itself failed");
        match &issue.kind {
            HealthIssueKind::MonitorFailure { errors } => {
                assert!(errors[0].contains("scrape timeout"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auto_fix_creates_one_planned_proposal_per_issue() {
        let h = harness(MonitorConfig {
            error_spike_threshold: 0,
            ..Default::default()
        });
        seed(&h.repo, ProposalStatus::Failed, None, false).await;

        let report = h.monitor.run_cycle().await;
        assert_eq!(report.created.len(), 1);
        let fix = h.repo.get(report.created[0]).await.unwrap().unwrap();
        assert_eq!(fix.trigger_type, TriggerType::AutoHealing);
        assert_eq!(fix.status, ProposalStatus::Planned);
        assert_eq!(fix.risk_level, Some(RiskLevel::High));
        assert!(fix.problem_statement.starts_with("Auto-detected issue: "));
        assert!(fix.branch_name.unwrap().starts_with("auto-fix/error-spike-"));

        // Same issue again inside the window: no duplicate.
        let report = h.monitor.run_cycle().await;
        assert!(report.created.is_empty());
    }

    #[tokio::test]
    async fn test_medium_issues_do_not_auto_fix() {
        let h = harness(MonitorConfig::default());
        h.metrics.set_response_time_ms(2_500.0).await;
        let report = h.monitor.run_cycle().await;
        assert!(!report.check.healthy);
        assert!(report.created.is_empty());
    }

    #[tokio::test]
    async fn test_auto_fix_publishes_branch_when_vcs_attached() {
        let repo = Arc::new(InMemoryProposalRepository::new());
        let vcs = Arc::new(MockVersionControl::new());
        let monitor = SelfHealingMonitor::new(
            repo.clone(),
            Arc::new(StaticMetricsSource::new()),
            Arc::new(SystemClock),
            MonitorConfig::default(),
        )
        .with_version_control(vcs.clone(), "main", Duration::from_secs(5));

        let issue = HealthIssue {
            id: "custom".to_string(),
            severity: Severity::Critical,
            kind: HealthIssueKind::ErrorSpike {
                failure_count: 50,
                threshold: 10,
            },
            description: "lots of failures".to_string(),
            suggested_action: None,
            detected_at: Utc::now(),
        };
        let proposal = monitor.trigger_auto_fix(&issue).await.unwrap().unwrap();
        assert_eq!(proposal.solution_approach, "Investigate and resolve the issue");
        assert_eq!(vcs.call_count(VcsOperation::CreateBranch).await, 1);
        assert_eq!(vcs.call_count(VcsOperation::CommitFiles).await, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_proposal() {
        let repo = Arc::new(InMemoryProposalRepository::new());
        let vcs = Arc::new(MockVersionControl::new());
        vcs.fail_on(VcsOperation::CreateBranch, "forbidden").await;
        let monitor = SelfHealingMonitor::new(
            repo.clone(),
            Arc::new(StaticMetricsSource::new()),
            Arc::new(SystemClock),
            MonitorConfig::default(),
        )
        .with_version_control(vcs.clone(), "main", Duration::from_secs(5));

        let issue = HealthIssue {
            id: "perf".to_string(),
            severity: Severity::High,
            kind: HealthIssueKind::PerformanceDegradation {
                avg_response_time_ms: 5000.0,
                threshold_ms: 2000.0,
            },
            description: "slow".to_string(),
            suggested_action: Some("tune".to_string()),
            detected_at: Utc::now(),
        };
        let proposal = monitor.trigger_auto_fix(&issue).await.unwrap().unwrap();
        assert!(repo.get(proposal.id).await.unwrap().is_some());
        assert_eq!(vcs.call_count(VcsOperation::CommitFiles).await, 0);
    }
}

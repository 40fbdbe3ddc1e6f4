//! Self-healing, learning and concurrent lifecycle behaviour on the SQLite store.

mod common;

use autopilot::adapters::mock::VcsOperation;
use autopilot::domain::models::{
    HealthIssueKind, PatternKind, ProposalStatus, RiskLevel, Severity, TriggerContext,
    TriggerType,
};
use autopilot::domain::ports::ProposalRepository;
use autopilot::DomainError;
use common::{docs_change, harness, seed};

#[tokio::test]
async fn test_error_spike_raises_one_auto_fix_per_window() {
    let h = harness().await;
    for _ in 0..11 {
        seed(&h.repo, TriggerType::NonCriticalError, ProposalStatus::Failed).await;
    }

    let first = h.api.health_check(true).await;
    assert!(!first.check.healthy);
    let spike = first
        .check
        .issues
        .iter()
        .find(|i| i.kind.label() == "error_spike")
        .expect("error spike issue");
    assert_eq!(spike.severity, Severity::High);
    assert!(matches!(
        spike.kind,
        HealthIssueKind::ErrorSpike { failure_count: 11, threshold: 10 }
    ));
    assert_eq!(first.created.len(), 1);

    let second = h.api.health_check(true).await;
    assert!(!second.check.healthy);
    assert!(second.created.is_empty());

    let fix = h.api.get(first.created[0]).await.unwrap();
    assert_eq!(fix.trigger_type, TriggerType::AutoHealing);
    assert_eq!(fix.status, ProposalStatus::Planned);
    assert_eq!(fix.risk_level, Some(RiskLevel::High));
    assert!(matches!(
        &fix.trigger_context,
        TriggerContext::AutoHealing { issue_id, .. } if issue_id == "error-spike"
    ));

    // The plan is published on its own branch.
    assert_eq!(h.vcs.call_count(VcsOperation::CreateBranch).await, 1);
    assert_eq!(h.vcs.call_count(VcsOperation::CommitFiles).await, 1);
}

#[tokio::test]
async fn test_health_check_without_auto_fix_only_reports() {
    let h = harness().await;
    for _ in 0..25 {
        seed(&h.repo, TriggerType::NonCriticalError, ProposalStatus::Failed).await;
    }

    let report = h.api.health_check(false).await;
    assert!(report
        .check
        .issues
        .iter()
        .any(|i| i.severity == Severity::Critical));
    assert!(report.created.is_empty());
    assert!(h.vcs.calls().await.is_empty());
}

#[tokio::test]
async fn test_auto_fix_scoring_replaces_seeded_risk() {
    let h = harness().await;
    h.metrics.set_response_time_ms(9_000.0).await;

    let report = h.api.health_check(true).await;
    assert_eq!(report.created.len(), 1);
    let id = report.created[0];
    assert_eq!(h.api.get(id).await.unwrap().risk_level, Some(RiskLevel::High));

    let eval = h.api.evaluate(id).await.unwrap();
    assert_eq!(eval.decision.risk_level, RiskLevel::Medium);
    assert_eq!(eval.proposal.risk_level, Some(RiskLevel::Medium));
}

#[tokio::test]
async fn test_metrics_outage_becomes_critical_issue() {
    let h = harness().await;
    h.metrics.set_failure(Some("metrics service unreachable")).await;

    let report = h.api.health_check(false).await;
    assert!(!report.check.healthy);
    let issue = report
        .check
        .issues
        .iter()
        .find(|i| i.id == "health-check-failure")
        .expect("monitor failure issue");
    assert_eq!(issue.severity, Severity::Critical);
    match &issue.kind {
        HealthIssueKind::MonitorFailure { errors } => {
            assert!(errors.iter().any(|e| e.contains("metrics service unreachable")));
        }
        other => panic!("unexpected issue kind: {other:?}"),
    }
}

#[tokio::test]
async fn test_learning_flags_failing_trigger() {
    let h = harness().await;
    for _ in 0..4 {
        seed(&h.repo, TriggerType::PerformanceIssue, ProposalStatus::Failed).await;
    }
    seed(&h.repo, TriggerType::PerformanceIssue, ProposalStatus::Deployed).await;

    let insight = h.api.learning_patterns().await;
    let failure = insight
        .patterns
        .iter()
        .find(|p| p.kind == PatternKind::Failure)
        .expect("failure pattern");
    assert_eq!(failure.occurrences, 5);
    assert!((0.5..=0.8).contains(&failure.confidence));
    assert!(insight
        .recommendations
        .iter()
        .any(|r| r.starts_with("Exercise caution")));
    assert_eq!(insight.metrics.total_improvements, 5);
    assert!((insight.metrics.success_rate - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_learning_on_empty_store() {
    let h = harness().await;
    let insight = h.api.learning_patterns().await;
    assert!(insight.patterns.is_empty());
    assert!(insight.recommendations.is_empty());
    assert_eq!(insight.metrics.total_improvements, 0);
}

#[tokio::test]
async fn test_concurrent_approvals_apply_once() {
    let h = harness().await;
    let p = h.api.create_proposal(docs_change()).await.unwrap();

    let (a, b) = tokio::join!(
        h.api.approve(p.id, Some("alice")),
        h.api.reject(p.id, Some("bob")),
    );
    let succeeded = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(succeeded, 1);
    for result in [&a, &b] {
        if let Err(e) = result {
            assert!(matches!(e, DomainError::InvalidStateTransition { .. }));
        }
    }

    let stored = h.repo.get(p.id).await.unwrap().unwrap();
    assert!(matches!(
        stored.status,
        ProposalStatus::Approved | ProposalStatus::Rejected
    ));
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_stale_writer_is_rejected() {
    let h = harness().await;
    let p = h.api.create_proposal(docs_change()).await.unwrap();

    let mut first = h.repo.get(p.id).await.unwrap().unwrap();
    let mut second = first.clone();

    first.solution_approach = "first writer".to_string();
    h.repo.update(&mut first).await.unwrap();

    second.solution_approach = "second writer".to_string();
    assert!(matches!(
        h.repo.update(&mut second).await,
        Err(DomainError::ConcurrencyConflict { .. })
    ));
    assert_eq!(
        h.repo.get(p.id).await.unwrap().unwrap().solution_approach,
        "first writer"
    );
}

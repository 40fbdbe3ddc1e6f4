//! Common test utilities for integration tests
//!
//! Builds the full application stack on an in-memory `SQLite` store with
//! recording fakes for version control and metrics.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use autopilot::adapters::metrics::StaticMetricsSource;
use autopilot::adapters::mock::MockVersionControl;
use autopilot::adapters::sqlite::{create_migrated_test_pool, SqliteProposalRepository};
use autopilot::domain::models::{
    CodeQualityMetrics, Config, ImprovementProposal, NewProposal, ProposalStatus, TriggerType,
};
use autopilot::domain::ports::{ProposalRepository, SystemClock};
use autopilot::{AppContext, AutonomyApi};
use chrono::Utc;

pub const ALL_CHECKS_PASSED: CodeQualityMetrics = CodeQualityMetrics {
    lint_passed: true,
    type_check_passed: true,
    security_scan_passed: true,
};

/// Everything a scenario needs to drive and inspect the pipeline.
pub struct Harness {
    pub api: AutonomyApi,
    pub repo: Arc<SqliteProposalRepository>,
    pub vcs: Arc<MockVersionControl>,
    pub metrics: Arc<StaticMetricsSource>,
    pub config: Config,
}

pub async fn harness() -> Harness {
    harness_with(Config::default()).await
}

pub async fn harness_with(config: Config) -> Harness {
    let pool = create_migrated_test_pool()
        .await
        .expect("Failed to create test database");
    let repo = Arc::new(SqliteProposalRepository::new(pool));
    let vcs = Arc::new(MockVersionControl::new());
    let metrics = Arc::new(StaticMetricsSource::new());
    let ctx = AppContext::from_parts(
        config.clone(),
        repo.clone(),
        vcs.clone(),
        metrics.clone(),
        Arc::new(SystemClock),
    );
    Harness {
        api: AutonomyApi::new(&ctx),
        repo,
        vcs,
        metrics,
        config,
    }
}

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// A small documentation fix with strong signals.
pub fn docs_change() -> NewProposal {
    NewProposal {
        trigger_type: Some(TriggerType::RoutineAudit),
        problem_statement: "Outdated setup instructions".to_string(),
        solution_approach: "Refresh the getting-started guide".to_string(),
        files_changed: set(&["docs/getting-started.md"]),
        lines_changed: 20,
        affected_modules: set(&["docs"]),
        test_coverage: Some(90.0),
        llm_confidence: Some(0.95),
        code_quality: Some(ALL_CHECKS_PASSED),
        ..Default::default()
    }
}

/// A large security fix touching critical modules.
pub fn security_change() -> NewProposal {
    NewProposal {
        trigger_type: Some(TriggerType::SecurityVulnerability),
        problem_statement: "Session tokens are not rotated".to_string(),
        solution_approach: "Rotate tokens on privilege change".to_string(),
        files_changed: set(&["src/auth/session.rs", "migrations/042_sessions.sql"]),
        lines_changed: 600,
        affected_modules: set(&["auth", "database"]),
        test_coverage: Some(100.0),
        llm_confidence: Some(1.0),
        code_quality: Some(ALL_CHECKS_PASSED),
        ..Default::default()
    }
}

/// Insert a proposal that already reached `status`.
pub async fn seed(repo: &SqliteProposalRepository, trigger: TriggerType, status: ProposalStatus) {
    let mut proposal = ImprovementProposal::new(
        NewProposal {
            trigger_type: Some(trigger),
            problem_statement: format!("historical {trigger}"),
            ..Default::default()
        },
        Utc::now(),
    )
    .expect("valid seed proposal");
    proposal.status = status;
    repo.create(&proposal).await.expect("seed insert");
}

/// Create a proposal and drive it to `Merged` through operator approval.
pub async fn merged(h: &Harness, input: NewProposal, pr: u64, sha: &str) -> ImprovementProposal {
    h.vcs.add_merged_pull_request(pr, sha).await;
    let p = h.api.create_proposal(input).await.expect("create");
    h.api.approve(p.id, Some("operator")).await.expect("approve");
    h.api.record_merge(p.id, pr, sha).await.expect("merge")
}

//! SQLite implementation of the ProposalRepository.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_datetime, parse_optional_json, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DecisionAction, DecisionResult, ImprovementProposal, ProposalOutcome, ProposalStatus,
    RiskLevel, TriggerType,
};
use crate::domain::ports::{ProposalFilter, ProposalRepository};

pub struct SqliteProposalRepository {
    pool: SqlitePool,
}

impl SqliteProposalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProposalRepository for SqliteProposalRepository {
    async fn create(&self, p: &ImprovementProposal) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO proposals (id, trigger_type, trigger_context, problem_statement, solution_approach,
               files_changed, lines_changed, affected_modules, test_coverage, llm_confidence, code_quality,
               risk_level, risk_score, confidence_score, risk_analysis, confidence_scoring, status, outcome,
               branch_name, pr_number, merge_commit_sha, canary, revision, version,
               created_at, updated_at, started_at, completed_at, deployed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(p.id.to_string())
        .bind(p.trigger_type.as_str())
        .bind(serde_json::to_string(&p.trigger_context)?)
        .bind(&p.problem_statement)
        .bind(&p.solution_approach)
        .bind(serde_json::to_string(&p.files_changed)?)
        .bind(i64::from(p.lines_changed))
        .bind(serde_json::to_string(&p.affected_modules)?)
        .bind(p.test_coverage)
        .bind(p.llm_confidence)
        .bind(p.code_quality.map(|q| serde_json::to_string(&q)).transpose()?)
        .bind(p.risk_level.map(|l| l.as_str()))
        .bind(p.risk_score.map(i64::from))
        .bind(p.confidence_score.map(i64::from))
        .bind(p.risk_analysis.as_ref().map(serde_json::to_string).transpose()?)
        .bind(p.confidence_scoring.as_ref().map(serde_json::to_string).transpose()?)
        .bind(p.status.as_str())
        .bind(p.outcome.map(|o| o.as_str()))
        .bind(&p.branch_name)
        .bind(p.pr_number.map(|n| n as i64))
        .bind(&p.merge_commit_sha)
        .bind(p.canary.as_ref().map(serde_json::to_string).transpose()?)
        .bind(i64::from(p.revision))
        .bind(p.version as i64)
        .bind(format_datetime(p.created_at))
        .bind(format_datetime(p.updated_at))
        .bind(p.started_at.map(format_datetime))
        .bind(p.completed_at.map(format_datetime))
        .bind(p.deployed_at.map(format_datetime))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ImprovementProposal>> {
        let row: Option<ProposalRow> = sqlx::query_as("SELECT * FROM proposals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, p: &mut ImprovementProposal) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await?;
        write_proposal(&mut *conn, p).await?;
        p.version += 1;
        Ok(())
    }

    async fn list(&self, filter: &ProposalFilter) -> DomainResult<Vec<ImprovementProposal>> {
        let mut query = String::from("SELECT * FROM proposals WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            query.push_str(&format!(" AND status IN ({placeholders})"));
            bindings.extend(filter.statuses.iter().map(|s| s.as_str().to_string()));
        }
        if let Some(trigger) = filter.trigger_type {
            query.push_str(" AND trigger_type = ?");
            bindings.push(trigger.as_str().to_string());
        }
        if let Some(after) = filter.created_after {
            query.push_str(" AND created_at >= ?");
            bindings.push(format_datetime(after));
        }
        if let Some(before) = filter.created_before {
            query.push_str(" AND created_at < ?");
            bindings.push(format_datetime(before));
        }
        if let Some(since) = filter.deployed_after {
            query.push_str(" AND deployed_at IS NOT NULL AND deployed_at >= ?");
            bindings.push(format_datetime(since));
            query.push_str(" ORDER BY deployed_at DESC");
        } else {
            query.push_str(" ORDER BY created_at DESC");
        }
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, ProposalRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<ProposalRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_decision(&self, d: &DecisionResult) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_decision(&mut *tx, d).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_with_decision(
        &self,
        p: &mut ImprovementProposal,
        d: &DecisionResult,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        write_proposal(&mut *tx, p).await?;
        insert_decision(&mut *tx, d).await?;
        tx.commit().await?;
        p.version += 1;
        Ok(())
    }

    async fn active_decision(&self, proposal_id: Uuid) -> DomainResult<Option<DecisionResult>> {
        let row: Option<DecisionRow> =
            sqlx::query_as("SELECT * FROM decisions WHERE proposal_id = ? AND active = 1")
                .bind(proposal_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn decision_history(&self, proposal_id: Uuid) -> DomainResult<Vec<DecisionResult>> {
        let rows: Vec<DecisionRow> =
            sqlx::query_as("SELECT * FROM decisions WHERE proposal_id = ? ORDER BY decided_at, rowid")
                .bind(proposal_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Optimistic write of `p` at `p.version`. The caller bumps its copy once
/// the surrounding write is committed.
async fn write_proposal(conn: &mut SqliteConnection, p: &ImprovementProposal) -> DomainResult<()> {
    let result = sqlx::query(
        r#"UPDATE proposals SET solution_approach = ?, files_changed = ?, lines_changed = ?,
           affected_modules = ?, test_coverage = ?, llm_confidence = ?, code_quality = ?,
           risk_level = ?, risk_score = ?, confidence_score = ?, risk_analysis = ?,
           confidence_scoring = ?, status = ?, outcome = ?, branch_name = ?, pr_number = ?,
           merge_commit_sha = ?, canary = ?, revision = ?, version = ?, updated_at = ?,
           started_at = ?, completed_at = ?, deployed_at = ?
           WHERE id = ? AND version = ?"#,
    )
    .bind(&p.solution_approach)
    .bind(serde_json::to_string(&p.files_changed)?)
    .bind(i64::from(p.lines_changed))
    .bind(serde_json::to_string(&p.affected_modules)?)
    .bind(p.test_coverage)
    .bind(p.llm_confidence)
    .bind(p.code_quality.map(|q| serde_json::to_string(&q)).transpose()?)
    .bind(p.risk_level.map(|l| l.as_str()))
    .bind(p.risk_score.map(i64::from))
    .bind(p.confidence_score.map(i64::from))
    .bind(p.risk_analysis.as_ref().map(serde_json::to_string).transpose()?)
    .bind(p.confidence_scoring.as_ref().map(serde_json::to_string).transpose()?)
    .bind(p.status.as_str())
    .bind(p.outcome.map(|o| o.as_str()))
    .bind(&p.branch_name)
    .bind(p.pr_number.map(|n| n as i64))
    .bind(&p.merge_commit_sha)
    .bind(p.canary.as_ref().map(serde_json::to_string).transpose()?)
    .bind(i64::from(p.revision))
    .bind((p.version + 1) as i64)
    .bind(format_datetime(p.updated_at))
    .bind(p.started_at.map(format_datetime))
    .bind(p.completed_at.map(format_datetime))
    .bind(p.deployed_at.map(format_datetime))
    .bind(p.id.to_string())
    .bind(p.version as i64)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM proposals WHERE id = ?")
            .bind(p.id.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match exists {
            Some(_) => DomainError::ConcurrencyConflict {
                entity: "proposal".to_string(),
                id: p.id.to_string(),
            },
            None => DomainError::ProposalNotFound(p.id),
        });
    }
    Ok(())
}

/// Insert `d` as the only active decision for its proposal.
async fn insert_decision(conn: &mut SqliteConnection, d: &DecisionResult) -> DomainResult<()> {
    sqlx::query("UPDATE decisions SET active = 0 WHERE proposal_id = ? AND active = 1")
        .bind(d.proposal_id.to_string())
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"INSERT INTO decisions (id, proposal_id, proposal_revision, action, reasoning, risk_level,
           risk_score, confidence_score, safety_checks, active, decided_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(d.id.to_string())
    .bind(d.proposal_id.to_string())
    .bind(i64::from(d.proposal_revision))
    .bind(d.action.as_str())
    .bind(&d.reasoning)
    .bind(d.risk_level.as_str())
    .bind(i64::from(d.risk_score))
    .bind(i64::from(d.confidence_score))
    .bind(serde_json::to_string(&d.safety_checks)?)
    .bind(format_datetime(d.decided_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct ProposalRow {
    id: String,
    trigger_type: String,
    trigger_context: String,
    problem_statement: String,
    solution_approach: String,
    files_changed: String,
    lines_changed: i64,
    affected_modules: String,
    test_coverage: Option<f64>,
    llm_confidence: Option<f64>,
    code_quality: Option<String>,
    risk_level: Option<String>,
    risk_score: Option<i64>,
    confidence_score: Option<i64>,
    risk_analysis: Option<String>,
    confidence_scoring: Option<String>,
    status: String,
    outcome: Option<String>,
    branch_name: Option<String>,
    pr_number: Option<i64>,
    merge_commit_sha: Option<String>,
    canary: Option<String>,
    revision: i64,
    version: i64,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    deployed_at: Option<String>,
}

fn score_from_row(v: Option<i64>) -> Option<u8> {
    v.map(|s| s.clamp(0, 100) as u8)
}

impl TryFrom<ProposalRow> for ImprovementProposal {
    type Error = DomainError;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        let status = ProposalStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        let risk_level = row
            .risk_level
            .map(|l| {
                RiskLevel::from_str(&l)
                    .ok_or_else(|| DomainError::SerializationError(format!("Invalid risk level: {l}")))
            })
            .transpose()?;

        let outcome = row
            .outcome
            .map(|o| {
                ProposalOutcome::from_str(&o)
                    .ok_or_else(|| DomainError::SerializationError(format!("Invalid outcome: {o}")))
            })
            .transpose()?;

        Ok(ImprovementProposal {
            id: parse_uuid(&row.id)?,
            trigger_type: TriggerType::from_str(&row.trigger_type),
            trigger_context: serde_json::from_str(&row.trigger_context)?,
            problem_statement: row.problem_statement,
            solution_approach: row.solution_approach,
            files_changed: serde_json::from_str(&row.files_changed)?,
            lines_changed: row.lines_changed.max(0) as u32,
            affected_modules: serde_json::from_str(&row.affected_modules)?,
            test_coverage: row.test_coverage,
            llm_confidence: row.llm_confidence,
            code_quality: parse_optional_json(row.code_quality)?,
            risk_level,
            risk_score: score_from_row(row.risk_score),
            confidence_score: score_from_row(row.confidence_score),
            risk_analysis: parse_optional_json(row.risk_analysis)?,
            confidence_scoring: parse_optional_json(row.confidence_scoring)?,
            status,
            outcome,
            branch_name: row.branch_name,
            pr_number: row.pr_number.map(|n| n as u64),
            merge_commit_sha: row.merge_commit_sha,
            canary: parse_optional_json(row.canary)?,
            revision: row.revision.max(0) as u32,
            version: row.version.max(0) as u64,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            deployed_at: parse_optional_datetime(row.deployed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    id: String,
    proposal_id: String,
    proposal_revision: i64,
    action: String,
    reasoning: String,
    risk_level: String,
    risk_score: i64,
    confidence_score: i64,
    safety_checks: String,
    active: i64,
    decided_at: String,
}

impl TryFrom<DecisionRow> for DecisionResult {
    type Error = DomainError;

    fn try_from(row: DecisionRow) -> Result<Self, Self::Error> {
        let action = DecisionAction::from_str(&row.action)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid action: {}", row.action)))?;
        let risk_level = RiskLevel::from_str(&row.risk_level).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid risk level: {}", row.risk_level))
        })?;

        Ok(DecisionResult {
            id: parse_uuid(&row.id)?,
            proposal_id: parse_uuid(&row.proposal_id)?,
            proposal_revision: row.proposal_revision.max(0) as u32,
            action,
            reasoning: row.reasoning,
            risk_level,
            risk_score: row.risk_score.clamp(0, 100) as u8,
            confidence_score: row.confidence_score.clamp(0, 100) as u8,
            safety_checks: serde_json::from_str(&row.safety_checks)?,
            active: row.active != 0,
            decided_at: parse_datetime(&row.decided_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{NewProposal, SafetyChecks};
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    async fn setup_test_repo() -> SqliteProposalRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteProposalRepository::new(pool)
    }

    fn proposal(trigger: TriggerType) -> ImprovementProposal {
        ImprovementProposal::new(
            NewProposal {
                trigger_type: Some(trigger),
                problem_statement: "Slow dashboard query".to_string(),
                files_changed: BTreeSet::from(["src/db/query.rs".to_string()]),
                lines_changed: 42,
                affected_modules: BTreeSet::from(["database".to_string()]),
                test_coverage: Some(75.0),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn decision(proposal_id: Uuid, action: DecisionAction) -> DecisionResult {
        DecisionResult {
            id: Uuid::new_v4(),
            proposal_id,
            proposal_revision: 1,
            action,
            reasoning: "test".to_string(),
            risk_level: RiskLevel::Low,
            risk_score: 12,
            confidence_score: 96,
            safety_checks: SafetyChecks {
                override_requires_review: false,
                confidence_acceptable: true,
                risk_is_low: true,
                confidence_meets_threshold: true,
                override_permits_auto_approve: true,
            },
            active: true,
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_proposal() {
        let repo = setup_test_repo().await;
        let p = proposal(TriggerType::PerformanceIssue);
        repo.create(&p).await.unwrap();

        let loaded = repo.get(p.id).await.unwrap().unwrap();
        assert_eq!(loaded.trigger_type, TriggerType::PerformanceIssue);
        assert_eq!(loaded.files_changed, p.files_changed);
        assert_eq!(loaded.status, ProposalStatus::Planned);
        assert_eq!(loaded.version, 0);
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_detects_conflicts() {
        let repo = setup_test_repo().await;
        let p = proposal(TriggerType::MinorFeedback);
        repo.create(&p).await.unwrap();

        let mut first = repo.get(p.id).await.unwrap().unwrap();
        let mut second = first.clone();

        first.transition(ProposalStatus::PendingReview, Utc::now()).unwrap();
        repo.update(&mut first).await.unwrap();
        assert_eq!(first.version, 1);

        second.transition(ProposalStatus::Rejected, Utc::now()).unwrap();
        let err = repo.update(&mut second).await.unwrap_err();
        assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));

        let stored = repo.get(p.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_update_missing_proposal() {
        let repo = setup_test_repo().await;
        let mut p = proposal(TriggerType::MinorFeedback);
        let err = repo.update(&mut p).await.unwrap_err();
        assert!(matches!(err, DomainError::ProposalNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_trigger() {
        let repo = setup_test_repo().await;
        let a = proposal(TriggerType::PerformanceIssue);
        let b = proposal(TriggerType::RoutineAudit);
        let mut c = proposal(TriggerType::PerformanceIssue);
        c.status = ProposalStatus::Failed;
        for p in [&a, &b, &c] {
            repo.create(p).await.unwrap();
        }

        let perf = repo
            .list(&ProposalFilter {
                trigger_type: Some(TriggerType::PerformanceIssue),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(perf.len(), 2);

        let failed = repo
            .list(&ProposalFilter::with_statuses([ProposalStatus::Failed]))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, c.id);

        let future = repo
            .list(&ProposalFilter {
                created_after: Some(Utc::now() + Duration::hours(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(future.is_empty());
    }

    #[tokio::test]
    async fn test_list_deployed_since_orders_and_limits() {
        let repo = setup_test_repo().await;
        let now = Utc::now();
        for hours_ago in [1, 30, 3, 2] {
            let mut p = proposal(TriggerType::MinorFeedback);
            p.status = ProposalStatus::Deployed;
            p.deployed_at = Some(now - Duration::hours(hours_ago));
            repo.create(&p).await.unwrap();
        }

        let recent = repo
            .list(&ProposalFilter::deployed_since(now - Duration::hours(24), 2))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].deployed_at > recent[1].deployed_at);
    }

    #[tokio::test]
    async fn test_record_decision_keeps_one_active() {
        let repo = setup_test_repo().await;
        let p = proposal(TriggerType::RoutineAudit);
        repo.create(&p).await.unwrap();

        repo.record_decision(&decision(p.id, DecisionAction::HumanReview)).await.unwrap();
        repo.record_decision(&decision(p.id, DecisionAction::AutoApprove)).await.unwrap();

        let active = repo.active_decision(p.id).await.unwrap().unwrap();
        assert_eq!(active.action, DecisionAction::AutoApprove);

        let history = repo.decision_history(p.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|d| d.active).count(), 1);
    }

    #[tokio::test]
    async fn test_update_with_decision_is_all_or_nothing() {
        let repo = setup_test_repo().await;
        let p = proposal(TriggerType::RoutineAudit);
        repo.create(&p).await.unwrap();

        let earlier = decision(p.id, DecisionAction::HumanReview);
        repo.record_decision(&earlier).await.unwrap();

        // Reusing a decision id fails the insert after the proposal row was written.
        let mut approved = repo.get(p.id).await.unwrap().unwrap();
        approved.transition(ProposalStatus::Approved, Utc::now()).unwrap();
        assert!(repo.update_with_decision(&mut approved, &earlier).await.is_err());
        assert_eq!(approved.version, 0);

        let stored = repo.get(p.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Planned);
        assert_eq!(stored.version, 0);
        assert_eq!(repo.decision_history(p.id).await.unwrap().len(), 1);

        let latest = decision(p.id, DecisionAction::AutoApprove);
        repo.update_with_decision(&mut approved, &latest).await.unwrap();
        assert_eq!(approved.version, 1);
        assert_eq!(
            repo.get(p.id).await.unwrap().unwrap().status,
            ProposalStatus::Approved
        );
        assert_eq!(repo.active_decision(p.id).await.unwrap().unwrap().id, latest.id);
    }
}

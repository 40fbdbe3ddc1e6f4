//! Automated rollback and canary supervision primitives.
//!
//! Rollbacks for one proposal are serialized through a per-proposal lock.
//! Every version control call carries its own timeout and is never retried
//! here: a failed rollback leaves the proposal `failed` / `rollback_failed`
//! for a human.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CanaryDeployment, CanaryEvaluation, CanaryMetrics, CanaryRequest, ImprovementProposal,
    ProposalOutcome, ProposalStatus, RollbackFailure, RollbackResult,
};
use crate::domain::ports::{Clock, MetricsSource, ProposalRepository, VersionControl};
use crate::services::proposal_updates::modify_proposal;

/// Run a collaborator call with a deadline.
pub(crate) async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> DomainResult<T>
where
    F: Future<Output = DomainResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::CollaboratorTimeout {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}

pub struct RollbackManager {
    repository: Arc<dyn ProposalRepository>,
    vcs: Arc<dyn VersionControl>,
    metrics: Arc<dyn MetricsSource>,
    clock: Arc<dyn Clock>,
    default_branch: String,
    vcs_timeout: Duration,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl RollbackManager {
    pub fn new(
        repository: Arc<dyn ProposalRepository>,
        vcs: Arc<dyn VersionControl>,
        metrics: Arc<dyn MetricsSource>,
        clock: Arc<dyn Clock>,
        default_branch: impl Into<String>,
        vcs_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            vcs,
            metrics,
            clock,
            default_branch: default_branch.into(),
            vcs_timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock for `id` unless another rollback holds or awaits it.
    async fn release_lock(&self, id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
    }

    /// Revert a merged proposal through a revert pull request.
    ///
    /// Version control failures are reported in the result, not as `Err`.
    /// `Err` means the proposal is unknown or the store failed.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn rollback(&self, id: Uuid) -> DomainResult<RollbackResult> {
        let lock = self.lock_for(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.rollback_serialized(id).await
        };
        self.release_lock(id, lock).await;
        result
    }

    async fn rollback_serialized(&self, id: Uuid) -> DomainResult<RollbackResult> {
        let proposal = self
            .repository
            .get(id)
            .await?
            .ok_or(DomainError::ProposalNotFound(id))?;

        if proposal.status == ProposalStatus::RolledBack {
            return Ok(RollbackResult::failed(id, RollbackFailure::AlreadyRolledBack));
        }
        if !proposal.status.is_revertible() {
            return Ok(RollbackResult::failed(
                id,
                RollbackFailure::NotEligible(proposal.status.to_string()),
            ));
        }

        tracing::info!("initiating automated rollback");
        let proposal = modify_proposal(self.repository.as_ref(), id, |p| {
            p.transition(ProposalStatus::RollingBack, self.clock.now())
        })
        .await?;

        let result = match self.revert(&proposal).await {
            Ok((pr_number, sha)) => RollbackResult::reverted(id, pr_number, sha),
            Err(failure) => RollbackResult::failed(id, failure),
        };

        if result.success {
            modify_proposal(self.repository.as_ref(), id, |p| {
                p.transition(ProposalStatus::RolledBack, self.clock.now())?;
                p.outcome = Some(ProposalOutcome::RolledBack);
                Ok(())
            })
            .await?;
            tracing::info!(revert_pr = ?result.revert_pr_number, "rollback completed");
        } else {
            modify_proposal(self.repository.as_ref(), id, |p| {
                p.transition(ProposalStatus::Failed, self.clock.now())?;
                p.outcome = Some(ProposalOutcome::RollbackFailed);
                Ok(())
            })
            .await?;
            tracing::error!(message = %result.message, "automated rollback failed");
        }
        Ok(result)
    }

    async fn revert(&self, proposal: &ImprovementProposal) -> Result<(u64, String), RollbackFailure> {
        let Some(pr_number) = proposal.pr_number else {
            return Err(RollbackFailure::NoPullRequest);
        };

        let pr = bounded(
            "get_pull_request",
            self.vcs_timeout,
            self.vcs.get_pull_request(pr_number),
        )
        .await
        .map_err(|e| RollbackFailure::PullRequestLookupFailed(e.to_string()))?;

        let merge_sha = match (pr.merged, pr.merge_commit_sha) {
            (true, Some(sha)) => sha,
            (true, None) => proposal
                .merge_commit_sha
                .clone()
                .ok_or(RollbackFailure::PullRequestNotMerged)?,
            (false, _) => return Err(RollbackFailure::PullRequestNotMerged),
        };

        let source_branch = proposal
            .branch_name
            .clone()
            .unwrap_or_else(|| ImprovementProposal::branch_name_for(proposal.id));
        let revert_branch = format!("revert/{source_branch}");
        let title = proposal.short_title();

        bounded(
            "create_branch",
            self.vcs_timeout,
            self.vcs.create_branch(&revert_branch, &self.default_branch),
        )
        .await
        .map_err(|e| RollbackFailure::RevertBranchFailed(e.to_string()))?;

        bounded(
            "revert_commit",
            self.vcs_timeout,
            self.vcs
                .revert_commit(&revert_branch, &merge_sha, &format!("Revert \"{title}\"")),
        )
        .await
        .map_err(|e| RollbackFailure::RevertCommitFailed(e.to_string()))?;

        let revert_pr = bounded(
            "open_pull_request",
            self.vcs_timeout,
            self.vcs.open_pull_request(
                &revert_branch,
                &self.default_branch,
                &format!("Revert: {title}"),
                &format!(
                    "Automated rollback of improvement #{pr_number}\n\nReason: Deployment failed or caused issues."
                ),
            ),
        )
        .await
        .map_err(|e| RollbackFailure::RevertPullRequestFailed(e.to_string()))?;

        let sha = bounded(
            "merge_pull_request",
            self.vcs_timeout,
            self.vcs.merge_pull_request(revert_pr.number),
        )
        .await
        .map_err(|e| RollbackFailure::RevertMergeFailed(e.to_string()))?;

        Ok((revert_pr.number, sha))
    }

    /// Move a merged proposal into a canary rollout.
    #[instrument(skip(self, request), fields(proposal_id = %id, target_percentage = request.target_percentage))]
    pub async fn start_canary(
        &self,
        id: Uuid,
        request: CanaryRequest,
    ) -> DomainResult<ImprovementProposal> {
        request.validate()?;
        let now = self.clock.now();
        let proposal = modify_proposal(self.repository.as_ref(), id, |p| {
            p.transition(ProposalStatus::CanaryDeployment, now)?;
            p.canary = Some(CanaryDeployment::start(request, now));
            Ok(())
        })
        .await?;
        tracing::info!(
            duration_minutes = request.duration_minutes,
            "canary deployment started"
        );
        Ok(proposal)
    }

    /// Compare live canary metrics against the proposal's criteria.
    ///
    /// Only reads. The caller decides whether to roll back.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn monitor_canary(&self, id: Uuid) -> DomainResult<CanaryEvaluation> {
        let now = self.clock.now();
        let verdict = |should_proceed: bool,
                       reason: String,
                       metrics: Option<CanaryMetrics>,
                       window_elapsed: bool| CanaryEvaluation {
            proposal_id: id,
            should_proceed,
            reason,
            metrics,
            window_elapsed,
            evaluated_at: now,
        };

        let Some(proposal) = self.repository.get(id).await? else {
            return Ok(verdict(false, "Improvement not found".to_string(), None, false));
        };
        let canary = match (proposal.status, proposal.canary) {
            (ProposalStatus::CanaryDeployment, Some(canary)) => canary,
            (status, _) => {
                return Ok(verdict(
                    false,
                    format!("Proposal is not in canary deployment (status {status})"),
                    None,
                    false,
                ))
            }
        };
        let window_elapsed = now >= canary.window_end();

        let metrics = match self.metrics.canary_metrics(id).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read canary metrics");
                return Ok(verdict(
                    false,
                    format!("Monitoring failed: {e}"),
                    None,
                    window_elapsed,
                ));
            }
        };

        let criteria = canary.success_criteria;
        let (should_proceed, reason) = if metrics.error_rate > criteria.max_error_rate {
            (
                false,
                format!(
                    "Error rate ({}) exceeds threshold ({})",
                    metrics.error_rate, criteria.max_error_rate
                ),
            )
        } else if metrics.success_rate < criteria.min_success_rate {
            (
                false,
                format!(
                    "Success rate ({}) below threshold ({})",
                    metrics.success_rate, criteria.min_success_rate
                ),
            )
        } else {
            (
                true,
                "Canary deployment metrics within acceptable range".to_string(),
            )
        };

        Ok(verdict(should_proceed, reason, Some(metrics), window_elapsed))
    }

    /// Promote a healthy canary to a full deployment.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn promote_canary(&self, id: Uuid) -> DomainResult<ImprovementProposal> {
        let proposal = modify_proposal(self.repository.as_ref(), id, |p| {
            if p.status != ProposalStatus::CanaryDeployment {
                return Err(DomainError::InvalidStateTransition {
                    from: p.status.to_string(),
                    to: ProposalStatus::Deployed.to_string(),
                    reason: "only canary deployments can be promoted".to_string(),
                });
            }
            p.transition(ProposalStatus::Deployed, self.clock.now())
        })
        .await?;
        tracing::info!("canary promoted to full deployment");
        Ok(proposal)
    }
}

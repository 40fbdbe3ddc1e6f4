//! Read-modify-write against the proposal store.
//!
//! Every mutation starts from a fresh read. A concurrency conflict means
//! someone else wrote in between, so the change is re-applied on top of
//! their version, a bounded number of times.

use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DecisionResult, ImprovementProposal};
use crate::domain::ports::ProposalRepository;

const MAX_ATTEMPTS: usize = 3;

/// Load `id`, apply `change` and persist. Returns the stored proposal.
pub async fn modify_proposal<F>(
    repository: &dyn ProposalRepository,
    id: Uuid,
    change: F,
) -> DomainResult<ImprovementProposal>
where
    F: FnMut(&mut ImprovementProposal) -> DomainResult<()> + Send,
{
    read_modify_write(repository, id, None, change).await
}

/// As [`modify_proposal`], storing `decision` in the same write.
pub async fn modify_proposal_with_decision<F>(
    repository: &dyn ProposalRepository,
    decision: &DecisionResult,
    change: F,
) -> DomainResult<ImprovementProposal>
where
    F: FnMut(&mut ImprovementProposal) -> DomainResult<()> + Send,
{
    read_modify_write(repository, decision.proposal_id, Some(decision), change).await
}

async fn read_modify_write<F>(
    repository: &dyn ProposalRepository,
    id: Uuid,
    decision: Option<&DecisionResult>,
    mut change: F,
) -> DomainResult<ImprovementProposal>
where
    F: FnMut(&mut ImprovementProposal) -> DomainResult<()> + Send,
{
    let mut attempt = 1;
    loop {
        let mut proposal = repository
            .get(id)
            .await?
            .ok_or(DomainError::ProposalNotFound(id))?;
        change(&mut proposal)?;
        let written = match decision {
            Some(decision) => repository.update_with_decision(&mut proposal, decision).await,
            None => repository.update(&mut proposal).await,
        };
        match written {
            Ok(()) => return Ok(proposal),
            Err(DomainError::ConcurrencyConflict { .. }) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(proposal_id = %id, attempt, "proposal changed underneath, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryProposalRepository;
    use crate::domain::models::{NewProposal, ProposalStatus, TriggerType};
    use chrono::Utc;

    #[tokio::test]
    async fn test_modify_applies_to_fresh_copy() {
        let repo = InMemoryProposalRepository::new();
        let p = ImprovementProposal::new(
            NewProposal {
                trigger_type: Some(TriggerType::MinorFeedback),
                problem_statement: "typo".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        repo.create(&p).await.unwrap();

        // A stale copy held elsewhere does not matter.
        let updated = modify_proposal(&repo, p.id, |p| p.transition(ProposalStatus::Approved, Utc::now()))
            .await
            .unwrap();
        assert_eq!(updated.status, ProposalStatus::Approved);
        assert_eq!(updated.version, 1);

        let err = modify_proposal(&repo, p.id, |p| p.transition(ProposalStatus::Planned, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_missing_proposal() {
        let repo = InMemoryProposalRepository::new();
        let id = Uuid::new_v4();
        let err = modify_proposal(&repo, id, |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, DomainError::ProposalNotFound(got) if got == id));
    }
}

//! In-memory proposal store for tests and offline runs.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DecisionResult, ImprovementProposal};
use crate::domain::ports::{ProposalFilter, ProposalRepository};

#[derive(Default)]
pub struct InMemoryProposalRepository {
    proposals: RwLock<HashMap<Uuid, ImprovementProposal>>,
    decisions: RwLock<Vec<DecisionResult>>,
}

impl InMemoryProposalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn create(&self, proposal: &ImprovementProposal) -> DomainResult<()> {
        let mut proposals = self.proposals.write().await;
        if proposals.contains_key(&proposal.id) {
            return Err(DomainError::ValidationFailed(format!(
                "proposal {} already exists",
                proposal.id
            )));
        }
        proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ImprovementProposal>> {
        Ok(self.proposals.read().await.get(&id).cloned())
    }

    async fn update(&self, proposal: &mut ImprovementProposal) -> DomainResult<()> {
        let mut proposals = self.proposals.write().await;
        let stored = current_version(&mut proposals, proposal)?;
        proposal.version += 1;
        *stored = proposal.clone();
        Ok(())
    }

    async fn list(&self, filter: &ProposalFilter) -> DomainResult<Vec<ImprovementProposal>> {
        let proposals = self.proposals.read().await;
        let mut matched: Vec<ImprovementProposal> = proposals
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();

        if filter.deployed_after.is_some() {
            matched.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at));
        } else {
            matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        if let Some(limit) = filter.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn record_decision(&self, decision: &DecisionResult) -> DomainResult<()> {
        let mut decisions = self.decisions.write().await;
        push_active(&mut decisions, decision)
    }

    async fn update_with_decision(
        &self,
        proposal: &mut ImprovementProposal,
        decision: &DecisionResult,
    ) -> DomainResult<()> {
        let mut proposals = self.proposals.write().await;
        let mut decisions = self.decisions.write().await;
        let stored = current_version(&mut proposals, proposal)?;
        push_active(&mut decisions, decision)?;
        proposal.version += 1;
        *stored = proposal.clone();
        Ok(())
    }

    async fn active_decision(&self, proposal_id: Uuid) -> DomainResult<Option<DecisionResult>> {
        Ok(self
            .decisions
            .read()
            .await
            .iter()
            .find(|d| d.proposal_id == proposal_id && d.active)
            .cloned())
    }

    async fn decision_history(&self, proposal_id: Uuid) -> DomainResult<Vec<DecisionResult>> {
        Ok(self
            .decisions
            .read()
            .await
            .iter()
            .filter(|d| d.proposal_id == proposal_id)
            .cloned()
            .collect())
    }
}

/// The stored row for `proposal`, provided its version still matches.
fn current_version<'a>(
    proposals: &'a mut HashMap<Uuid, ImprovementProposal>,
    proposal: &ImprovementProposal,
) -> DomainResult<&'a mut ImprovementProposal> {
    let stored = proposals
        .get_mut(&proposal.id)
        .ok_or(DomainError::ProposalNotFound(proposal.id))?;
    if stored.version != proposal.version {
        return Err(DomainError::ConcurrencyConflict {
            entity: "proposal".to_string(),
            id: proposal.id.to_string(),
        });
    }
    Ok(stored)
}

fn push_active(decisions: &mut Vec<DecisionResult>, decision: &DecisionResult) -> DomainResult<()> {
    if decisions.iter().any(|d| d.id == decision.id) {
        return Err(DomainError::ValidationFailed(format!(
            "decision {} already recorded",
            decision.id
        )));
    }
    for existing in decisions
        .iter_mut()
        .filter(|d| d.proposal_id == decision.proposal_id)
    {
        existing.active = false;
    }
    let mut recorded = decision.clone();
    recorded.active = true;
    decisions.push(recorded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        DecisionAction, NewProposal, ProposalStatus, RiskLevel, SafetyChecks, TriggerType,
    };
    use chrono::Utc;

    fn proposal() -> ImprovementProposal {
        ImprovementProposal::new(
            NewProposal {
                trigger_type: Some(TriggerType::RoutineAudit),
                problem_statement: "Remove dead flag".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let repo = InMemoryProposalRepository::new();
        let p = proposal();
        repo.create(&p).await.unwrap();

        let mut a = repo.get(p.id).await.unwrap().unwrap();
        let mut b = a.clone();
        a.transition(ProposalStatus::Approved, Utc::now()).unwrap();
        repo.update(&mut a).await.unwrap();

        b.transition(ProposalStatus::Rejected, Utc::now()).unwrap();
        assert!(matches!(
            repo.update(&mut b).await,
            Err(DomainError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let repo = InMemoryProposalRepository::new();
        let p = proposal();
        repo.create(&p).await.unwrap();
        assert!(repo.create(&p).await.is_err());
    }

    fn decision(proposal_id: Uuid) -> DecisionResult {
        DecisionResult {
            id: Uuid::new_v4(),
            proposal_id,
            proposal_revision: 1,
            action: DecisionAction::AutoApprove,
            reasoning: "low risk".to_string(),
            risk_level: RiskLevel::Low,
            risk_score: 10,
            confidence_score: 97,
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
    async fn test_update_with_decision_writes_both_or_neither() {
        let repo = InMemoryProposalRepository::new();
        let p = proposal();
        repo.create(&p).await.unwrap();
        let recorded = decision(p.id);
        repo.record_decision(&recorded).await.unwrap();

        let mut approved = repo.get(p.id).await.unwrap().unwrap();
        approved.transition(ProposalStatus::Approved, Utc::now()).unwrap();
        assert!(repo.update_with_decision(&mut approved, &recorded).await.is_err());
        assert_eq!(
            repo.get(p.id).await.unwrap().unwrap().status,
            ProposalStatus::Planned
        );

        let fresh = decision(p.id);
        repo.update_with_decision(&mut approved, &fresh).await.unwrap();
        assert_eq!(approved.version, 1);
        assert_eq!(repo.active_decision(p.id).await.unwrap().unwrap().id, fresh.id);
        assert_eq!(repo.decision_history(p.id).await.unwrap().len(), 2);
    }
}

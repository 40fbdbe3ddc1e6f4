//! Proposal store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DecisionResult, ImprovementProposal, ProposalStatus, TriggerType};

/// Filter for listing proposals.
///
/// Results are ordered newest first: by `deployed_at` when `deployed_after`
/// is set, by `created_at` otherwise.
#[derive(Debug, Clone, Default)]
pub struct ProposalFilter {
    /// Match any of these statuses (all statuses when empty).
    pub statuses: Vec<ProposalStatus>,
    pub trigger_type: Option<TriggerType>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub deployed_after: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl ProposalFilter {
    pub fn with_statuses(statuses: impl IntoIterator<Item = ProposalStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Proposals deployed at or after `since`, most recent first.
    pub fn deployed_since(since: DateTime<Utc>, limit: u32) -> Self {
        Self {
            deployed_after: Some(since),
            limit: Some(limit),
            ..Default::default()
        }
    }

    /// Whether `proposal` passes every criterion except `limit`.
    pub fn matches(&self, proposal: &ImprovementProposal) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&proposal.status) {
            return false;
        }
        if self.trigger_type.is_some_and(|t| t != proposal.trigger_type) {
            return false;
        }
        if self.created_after.is_some_and(|t| proposal.created_at < t) {
            return false;
        }
        if self.created_before.is_some_and(|t| proposal.created_at >= t) {
            return false;
        }
        if let Some(since) = self.deployed_after {
            match proposal.deployed_at {
                Some(at) if at >= since => {}
                _ => return false,
            }
        }
        true
    }
}

/// Repository interface for proposal persistence.
///
/// Proposals are never deleted. `update` is optimistic: it succeeds only
/// when the stored version equals `proposal.version`, then bumps the
/// version on both the row and the caller's copy.
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    /// Insert a new proposal.
    async fn create(&self, proposal: &ImprovementProposal) -> DomainResult<()>;

    /// Get a proposal by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<ImprovementProposal>>;

    /// Persist changes made to a freshly read proposal.
    async fn update(&self, proposal: &mut ImprovementProposal) -> DomainResult<()>;

    /// List proposals matching a filter.
    async fn list(&self, filter: &ProposalFilter) -> DomainResult<Vec<ImprovementProposal>>;

    /// Record a decision and make it the only active one for its proposal.
    async fn record_decision(&self, decision: &DecisionResult) -> DomainResult<()>;

    /// `update` and `record_decision` as one atomic write. On error neither
    /// the proposal nor its decision history has changed.
    async fn update_with_decision(
        &self,
        proposal: &mut ImprovementProposal,
        decision: &DecisionResult,
    ) -> DomainResult<()>;

    /// The active decision for a proposal, if any.
    async fn active_decision(&self, proposal_id: Uuid) -> DomainResult<Option<DecisionResult>>;

    /// Every decision recorded for a proposal, oldest first.
    async fn decision_history(&self, proposal_id: Uuid) -> DomainResult<Vec<DecisionResult>>;
}

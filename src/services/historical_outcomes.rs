//! Shared historical-outcome query.
//!
//! Risk and confidence both consume "how did similar proposals go". Similar
//! means same trigger type; the success/failure split is the one the
//! learning engine uses.

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{HistoricalData, ImprovementProposal, ProposalStatus, TriggerType};
use crate::domain::ports::{ProposalFilter, ProposalRepository};

pub const CONCLUDED_STATUSES: [ProposalStatus; 6] = [
    ProposalStatus::Approved,
    ProposalStatus::Merged,
    ProposalStatus::Deployed,
    ProposalStatus::Rejected,
    ProposalStatus::Failed,
    ProposalStatus::RolledBack,
];

pub struct HistoricalOutcomes {
    repository: Arc<dyn ProposalRepository>,
}

impl HistoricalOutcomes {
    pub fn new(repository: Arc<dyn ProposalRepository>) -> Self {
        Self { repository }
    }

    /// Outcome history for concluded proposals with the same trigger.
    /// `None` when there is none.
    pub async fn for_trigger(&self, trigger: TriggerType) -> DomainResult<Option<HistoricalData>> {
        let concluded = self
            .repository
            .list(&ProposalFilter {
                statuses: CONCLUDED_STATUSES.to_vec(),
                trigger_type: Some(trigger),
                ..Default::default()
            })
            .await?;
        Ok(summarize(&concluded))
    }
}

/// Success share over a set of concluded proposals.
pub fn summarize(concluded: &[ImprovementProposal]) -> Option<HistoricalData> {
    if concluded.is_empty() {
        return None;
    }
    let successes = concluded.iter().filter(|p| p.is_success()).count();
    Some(HistoricalData {
        similar_count: concluded.len() as u32,
        success_rate: successes as f64 / concluded.len() as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryProposalRepository;
    use crate::domain::models::NewProposal;
    use chrono::Utc;

    async fn seed(repo: &InMemoryProposalRepository, trigger: TriggerType, status: ProposalStatus) {
        let mut p = ImprovementProposal::new(
            NewProposal {
                trigger_type: Some(trigger),
                problem_statement: "seeded".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        p.status = status;
        repo.create(&p).await.unwrap();
    }

    #[tokio::test]
    async fn test_for_trigger_counts_only_concluded_matching_proposals() {
        let repo = Arc::new(InMemoryProposalRepository::new());
        seed(&repo, TriggerType::MinorFeedback, ProposalStatus::Deployed).await;
        seed(&repo, TriggerType::MinorFeedback, ProposalStatus::Merged).await;
        seed(&repo, TriggerType::MinorFeedback, ProposalStatus::RolledBack).await;
        seed(&repo, TriggerType::MinorFeedback, ProposalStatus::Planned).await;
        seed(&repo, TriggerType::CriticalError, ProposalStatus::Deployed).await;

        let outcomes = HistoricalOutcomes::new(repo);
        let history = outcomes
            .for_trigger(TriggerType::MinorFeedback)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history.similar_count, 3);
        assert!((history.success_rate - 2.0 / 3.0).abs() < 1e-9);

        assert!(outcomes
            .for_trigger(TriggerType::SecurityVulnerability)
            .await
            .unwrap()
            .is_none());
    }
}

//! Risk + confidence + decision for stored proposals.
//!
//! Risk and confidence are computed concurrently from one historical
//! query; the decision only runs once both are in hand and bound to the
//! proposal's current revision.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConfidenceScoringInput, ConfidenceScoringResult, DecisionAction, DecisionResult,
    ImprovementProposal, ProposalOutcome, ProposalStatus, RiskAnalysisInput, RiskAnalysisResult,
};
use crate::domain::ports::{Clock, ProposalRepository};
use crate::services::confidence_scorer::ConfidenceScorer;
use crate::services::decision_engine::{DecisionEngine, DecisionSubject};
use crate::services::historical_outcomes::HistoricalOutcomes;
use crate::services::proposal_updates::{modify_proposal, modify_proposal_with_decision};
use crate::services::risk_analyzer::RiskAnalyzer;

/// Final state of a proposal after a decision.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub proposal: ImprovementProposal,
    pub decision: DecisionResult,
}

pub struct EvaluationPipeline {
    repository: Arc<dyn ProposalRepository>,
    history: HistoricalOutcomes,
    risk: RiskAnalyzer,
    confidence: ConfidenceScorer,
    engine: DecisionEngine,
    clock: Arc<dyn Clock>,
}

impl EvaluationPipeline {
    pub fn new(
        repository: Arc<dyn ProposalRepository>,
        engine: DecisionEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            history: HistoricalOutcomes::new(repository.clone()),
            repository,
            risk: RiskAnalyzer::new(),
            confidence: ConfidenceScorer::new(),
            engine,
            clock,
        }
    }

    async fn load_undecided(&self, id: Uuid) -> DomainResult<ImprovementProposal> {
        let proposal = self
            .repository
            .get(id)
            .await?
            .ok_or(DomainError::ProposalNotFound(id))?;
        if !proposal.status.is_undecided() {
            return Err(DomainError::InvalidStateTransition {
                from: proposal.status.to_string(),
                to: ProposalStatus::PendingReview.to_string(),
                reason: "proposal has already been decided".to_string(),
            });
        }
        proposal.validate_inputs()?;
        Ok(proposal)
    }

    /// Store the results on the proposal, provided nobody revised it since
    /// they were computed.
    async fn attach(
        &self,
        id: Uuid,
        revision: u32,
        risk: Option<RiskAnalysisResult>,
        confidence: Option<ConfidenceScoringResult>,
    ) -> DomainResult<ImprovementProposal> {
        let now = self.clock.now();
        modify_proposal(self.repository.as_ref(), id, |p| {
            if p.revision != revision {
                return Err(DomainError::StaleAssessment {
                    proposal_id: id,
                    expected_revision: p.revision,
                });
            }
            if let Some(r) = &risk {
                p.attach_risk(r.clone(), now);
            }
            if let Some(c) = &confidence {
                p.attach_confidence(c.clone(), now);
            }
            p.mark_started(now);
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn analyze_risk(&self, id: Uuid) -> DomainResult<RiskAnalysisResult> {
        let proposal = self.load_undecided(id).await?;
        let history = self.history.for_trigger(proposal.trigger_type).await?;
        let result = self
            .risk
            .analyze(&RiskAnalysisInput::from_proposal(&proposal, history))?
            .for_revision(proposal.revision);
        self.attach(id, proposal.revision, Some(result.clone()), None)
            .await?;
        Ok(result)
    }

    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn score_confidence(&self, id: Uuid) -> DomainResult<ConfidenceScoringResult> {
        let proposal = self.load_undecided(id).await?;
        let history = self.history.for_trigger(proposal.trigger_type).await?;
        let result = self
            .confidence
            .score(&ConfidenceScoringInput::from_proposal(&proposal, history))?
            .for_revision(proposal.revision);
        self.attach(id, proposal.revision, None, Some(result.clone()))
            .await?;
        Ok(result)
    }

    /// Decide from the stored results. Both must belong to the current
    /// revision.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn decide(&self, id: Uuid) -> DomainResult<Evaluation> {
        let proposal = self.load_undecided(id).await?;
        let stale = || DomainError::StaleAssessment {
            proposal_id: id,
            expected_revision: proposal.revision,
        };
        let risk = proposal
            .risk_analysis
            .as_ref()
            .filter(|r| r.revision == proposal.revision)
            .ok_or_else(stale)?;
        let confidence = proposal
            .confidence_scoring
            .as_ref()
            .filter(|c| c.revision == proposal.revision)
            .ok_or_else(stale)?;

        let decision = self.engine.decide(
            DecisionSubject {
                proposal_id: id,
                revision: proposal.revision,
                trigger_type: proposal.trigger_type,
                affected_modules: &proposal.affected_modules,
            },
            risk,
            confidence,
        );
        self.apply(decision).await
    }

    /// Full pass: history once, risk and confidence joined, then decide.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub async fn evaluate(&self, id: Uuid) -> DomainResult<Evaluation> {
        let proposal = self.load_undecided(id).await?;
        let history = self.history.for_trigger(proposal.trigger_type).await?;

        let risk_input = RiskAnalysisInput::from_proposal(&proposal, history);
        let confidence_input = ConfidenceScoringInput::from_proposal(&proposal, history);
        let (risk, confidence) = tokio::join!(
            async { self.risk.analyze(&risk_input) },
            async { self.confidence.score(&confidence_input) },
        );
        let risk = risk?.for_revision(proposal.revision);
        let confidence = confidence?.for_revision(proposal.revision);

        let proposal = self
            .attach(id, proposal.revision, Some(risk.clone()), Some(confidence.clone()))
            .await?;

        let decision = self.engine.decide(
            DecisionSubject {
                proposal_id: id,
                revision: proposal.revision,
                trigger_type: proposal.trigger_type,
                affected_modules: &proposal.affected_modules,
            },
            &risk,
            &confidence,
        );
        self.apply(decision).await
    }

    /// Move the proposal to the decided status and record the decision in
    /// one write.
    async fn apply(&self, decision: DecisionResult) -> DomainResult<Evaluation> {
        let id = decision.proposal_id;
        let revision = decision.proposal_revision;
        let action = decision.action;
        let now = self.clock.now();
        let proposal = modify_proposal_with_decision(self.repository.as_ref(), &decision, |p| {
            if p.revision != revision {
                return Err(DomainError::StaleAssessment {
                    proposal_id: id,
                    expected_revision: p.revision,
                });
            }
            match action {
                DecisionAction::AutoApprove => {
                    p.transition(ProposalStatus::Approved, now)?;
                    p.outcome = Some(ProposalOutcome::AutoApproved);
                }
                DecisionAction::HumanReview => p.transition(ProposalStatus::PendingReview, now)?,
                DecisionAction::Reject => p.transition(ProposalStatus::Rejected, now)?,
            }
            Ok(())
        })
        .await?;

        tracing::info!(
            action = %decision.action,
            status = %proposal.status,
            risk_score = decision.risk_score,
            confidence_score = decision.confidence_score,
            "proposal decided"
        );
        Ok(Evaluation { proposal, decision })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryProposalRepository;
    use crate::domain::models::{
        CodeQualityMetrics, DecisionConfig, NewProposal, ProposalRevision, RiskLevel, TriggerType,
    };
    use crate::domain::ports::ProposalFilter;
    use crate::domain::ports::SystemClock;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeSet;

    /// Proposal writes succeed, decision writes fail.
    struct DecisionWritesFail(InMemoryProposalRepository);

    #[async_trait]
    impl ProposalRepository for DecisionWritesFail {
        async fn create(&self, proposal: &ImprovementProposal) -> DomainResult<()> {
            self.0.create(proposal).await
        }

        async fn get(&self, id: Uuid) -> DomainResult<Option<ImprovementProposal>> {
            self.0.get(id).await
        }

        async fn update(&self, proposal: &mut ImprovementProposal) -> DomainResult<()> {
            self.0.update(proposal).await
        }

        async fn list(&self, filter: &ProposalFilter) -> DomainResult<Vec<ImprovementProposal>> {
            self.0.list(filter).await
        }

        async fn record_decision(&self, _decision: &DecisionResult) -> DomainResult<()> {
            Err(DomainError::DatabaseError("disk I/O error".to_string()))
        }

        async fn update_with_decision(
            &self,
            _proposal: &mut ImprovementProposal,
            _decision: &DecisionResult,
        ) -> DomainResult<()> {
            Err(DomainError::DatabaseError("disk I/O error".to_string()))
        }

        async fn active_decision(&self, proposal_id: Uuid) -> DomainResult<Option<DecisionResult>> {
            self.0.active_decision(proposal_id).await
        }

        async fn decision_history(&self, proposal_id: Uuid) -> DomainResult<Vec<DecisionResult>> {
            self.0.decision_history(proposal_id).await
        }
    }

    fn pipeline(repo: Arc<InMemoryProposalRepository>) -> EvaluationPipeline {
        EvaluationPipeline::new(
            repo,
            DecisionEngine::new(DecisionConfig::default()),
            Arc::new(SystemClock),
        )
    }

    async fn docs_proposal(repo: &InMemoryProposalRepository) -> Uuid {
        let p = ImprovementProposal::new(
            NewProposal {
                trigger_type: Some(TriggerType::RoutineAudit),
                problem_statement: "Clarify setup docs".to_string(),
                files_changed: BTreeSet::from(["docs/setup.md".to_string()]),
                lines_changed: 20,
                affected_modules: BTreeSet::from(["docs".to_string()]),
                test_coverage: Some(90.0),
                llm_confidence: Some(0.95),
                code_quality: Some(CodeQualityMetrics {
                    lint_passed: true,
                    type_check_passed: true,
                    security_scan_passed: true,
                }),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        repo.create(&p).await.unwrap();
        p.id
    }

    #[tokio::test]
    async fn test_evaluate_without_history_goes_to_review() {
        let repo = Arc::new(InMemoryProposalRepository::new());
        let id = docs_proposal(&repo).await;

        let eval = pipeline(repo.clone()).evaluate(id).await.unwrap();
        assert_eq!(eval.decision.risk_level, RiskLevel::Low);
        assert_eq!(eval.decision.confidence_score, 86);
        assert_eq!(eval.decision.action, DecisionAction::HumanReview);
        assert_eq!(eval.proposal.status, ProposalStatus::PendingReview);
        assert!(eval.proposal.started_at.is_some());

        let active = repo.active_decision(id).await.unwrap().unwrap();
        assert_eq!(active.id, eval.decision.id);
    }

    #[tokio::test]
    async fn test_decide_requires_fresh_results() {
        let repo = Arc::new(InMemoryProposalRepository::new());
        let id = docs_proposal(&repo).await;
        let pipeline = pipeline(repo.clone());

        assert!(matches!(
            pipeline.decide(id).await,
            Err(DomainError::StaleAssessment { .. })
        ));

        pipeline.analyze_risk(id).await.unwrap();
        pipeline.score_confidence(id).await.unwrap();

        modify_proposal(repo.as_ref(), id, |p| {
            p.revise(
                ProposalRevision {
                    lines_changed: Some(30),
                    ..Default::default()
                },
                Utc::now(),
            )
        })
        .await
        .unwrap();
        let err = pipeline.decide(id).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::StaleAssessment { expected_revision: 2, .. }
        ));

        pipeline.analyze_risk(id).await.unwrap();
        pipeline.score_confidence(id).await.unwrap();
        let eval = pipeline.decide(id).await.unwrap();
        assert_eq!(eval.decision.proposal_revision, 2);
    }

    #[tokio::test]
    async fn test_decided_proposal_cannot_be_rescored() {
        let repo = Arc::new(InMemoryProposalRepository::new());
        let id = docs_proposal(&repo).await;
        let pipeline = pipeline(repo.clone());

        modify_proposal(repo.as_ref(), id, |p| p.transition(ProposalStatus::Rejected, Utc::now()))
            .await
            .unwrap();
        assert!(matches!(
            pipeline.evaluate(id).await,
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_low_confidence_rejects() {
        let repo = Arc::new(InMemoryProposalRepository::new());
        let p = ImprovementProposal::new(
            NewProposal {
                trigger_type: Some(TriggerType::MinorFeedback),
                problem_statement: "Vague idea".to_string(),
                llm_confidence: Some(0.1),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        repo.create(&p).await.unwrap();

        let eval = pipeline(repo).evaluate(p.id).await.unwrap();
        assert_eq!(eval.decision.action, DecisionAction::Reject);
        assert_eq!(eval.proposal.status, ProposalStatus::Rejected);
        assert!(eval.proposal.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_decision_write_leaves_proposal_undecided() {
        let repo = Arc::new(DecisionWritesFail(InMemoryProposalRepository::new()));
        let p = ImprovementProposal::new(
            NewProposal {
                trigger_type: Some(TriggerType::MinorFeedback),
                problem_statement: "Vague idea".to_string(),
                llm_confidence: Some(0.1),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        repo.create(&p).await.unwrap();
        let pipeline = EvaluationPipeline::new(
            repo.clone(),
            DecisionEngine::new(DecisionConfig::default()),
            Arc::new(SystemClock),
        );

        assert!(matches!(
            pipeline.evaluate(p.id).await,
            Err(DomainError::DatabaseError(_))
        ));
        let stored = repo.get(p.id).await.unwrap().unwrap();
        assert!(stored.status.is_undecided());
        assert!(repo.active_decision(p.id).await.unwrap().is_none());

        // The store recovers and the same proposal can be decided.
        let pipeline = pipeline_over(InMemoryProposalRepository::new(), stored).await;
        let eval = pipeline.evaluate(p.id).await.unwrap();
        assert_eq!(eval.proposal.status, ProposalStatus::Rejected);
    }

    async fn pipeline_over(
        repo: InMemoryProposalRepository,
        proposal: ImprovementProposal,
    ) -> EvaluationPipeline {
        repo.create(&proposal).await.unwrap();
        pipeline(Arc::new(repo))
    }
}

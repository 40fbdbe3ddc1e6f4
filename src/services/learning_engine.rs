//! Batch pattern mining over concluded proposals.
//!
//! Output is advisory. Nothing here feeds back into thresholds.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    DecisionAction, ImprovementProposal, LearningConfig, LearningInsight, LearningMetrics,
    Pattern, PatternKind, PatternSubject, ProposalOutcome, ProposalStatus, TriggerType,
};
use crate::domain::ports::{ProposalFilter, ProposalRepository};
use crate::services::historical_outcomes::CONCLUDED_STATUSES;

pub struct LearningEngine {
    repository: Arc<dyn ProposalRepository>,
    config: LearningConfig,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: u32,
    successes: u32,
    failures: u32,
}

impl Tally {
    fn add(&mut self, proposal: &ImprovementProposal) {
        self.total += 1;
        if proposal.is_success() {
            self.successes += 1;
        } else if proposal.is_failure() {
            self.failures += 1;
        }
    }
}

impl LearningEngine {
    pub fn new(repository: Arc<dyn ProposalRepository>, config: LearningConfig) -> Self {
        Self { repository, config }
    }

    /// Mine patterns, recommendations and metrics.
    ///
    /// Store failures are logged and produce an empty insight.
    #[instrument(skip(self))]
    pub async fn analyze_patterns(&self) -> LearningInsight {
        match self.try_analyze().await {
            Ok(insight) => {
                tracing::info!(
                    patterns = insight.patterns.len(),
                    recommendations = insight.recommendations.len(),
                    total_improvements = insight.metrics.total_improvements,
                    "learning run complete"
                );
                insight
            }
            Err(e) => {
                tracing::warn!(error = %e, "learning run failed, returning empty insight");
                LearningInsight::default()
            }
        }
    }

    async fn try_analyze(&self) -> DomainResult<LearningInsight> {
        let concluded = self
            .repository
            .list(&ProposalFilter::with_statuses(CONCLUDED_STATUSES))
            .await?;

        let mut by_trigger: BTreeMap<TriggerType, Tally> = BTreeMap::new();
        let mut by_module: BTreeMap<String, Tally> = BTreeMap::new();
        for p in &concluded {
            by_trigger.entry(p.trigger_type).or_default().add(p);
            for module in &p.affected_modules {
                by_module.entry(module.clone()).or_default().add(p);
            }
        }

        let mut patterns = Vec::new();
        for (trigger, tally) in by_trigger {
            patterns.extend(self.patterns_for(PatternSubject::TriggerType(trigger), tally));
        }
        for (module, tally) in by_module {
            patterns.extend(self.patterns_for(PatternSubject::Module(module), tally));
        }

        let recommendations = self.recommendations(&patterns);
        let metrics = self.metrics().await?;

        Ok(LearningInsight {
            patterns,
            recommendations,
            metrics,
        })
    }

    fn patterns_for(&self, subject: PatternSubject, tally: Tally) -> Vec<Pattern> {
        if tally.total < self.config.min_samples {
            return Vec::new();
        }
        let total = f64::from(tally.total);
        let success_rate = f64::from(tally.successes) / total;
        let failure_rate = f64::from(tally.failures) / total;
        let sample_cap = total / 10.0;

        let mut out = Vec::new();
        if success_rate > self.config.success_pattern_rate {
            out.push(self.pattern(
                PatternKind::Success,
                &subject,
                tally.total,
                tally.successes,
                success_rate,
                sample_cap,
            ));
        }
        if failure_rate > self.config.failure_pattern_rate {
            out.push(self.pattern(
                PatternKind::Failure,
                &subject,
                tally.total,
                tally.failures,
                failure_rate,
                sample_cap,
            ));
        }
        out
    }

    fn pattern(
        &self,
        kind: PatternKind,
        subject: &PatternSubject,
        occurrences: u32,
        matching: u32,
        rate: f64,
        sample_cap: f64,
    ) -> Pattern {
        let (prefix, key) = match subject {
            PatternSubject::TriggerType(t) => ("trigger", t.as_str().to_string()),
            PatternSubject::Module(m) => ("module", m.clone()),
        };
        let (suffix, wording) = match kind {
            PatternKind::Success => ("success", "high success"),
            PatternKind::Failure => ("failure", "high failure"),
        };
        let noun = match subject {
            PatternSubject::TriggerType(_) => "Improvements triggered by",
            PatternSubject::Module(_) => "Improvements touching module",
        };
        Pattern {
            id: format!("{prefix}-{suffix}-{key}"),
            kind,
            subject: subject.clone(),
            description: format!(
                "{noun} \"{key}\" have a {wording} rate ({:.0}%)",
                rate * 100.0
            ),
            confidence: rate.min(sample_cap),
            occurrences,
            matching,
            rate,
            created_at: Utc::now(),
        }
    }

    fn recommendations(&self, patterns: &[Pattern]) -> Vec<String> {
        patterns
            .iter()
            .filter_map(|p| {
                let key = match &p.subject {
                    PatternSubject::TriggerType(t) => format!("type \"{t}\""),
                    PatternSubject::Module(m) => format!("module \"{m}\""),
                };
                match p.kind {
                    PatternKind::Success
                        if p.confidence > self.config.auto_approve_suggestion_confidence =>
                    {
                        Some(format!(
                            "Consider auto-approving improvements of {key} due to high historical success rate."
                        ))
                    }
                    PatternKind::Failure if p.confidence >= self.config.caution_confidence => {
                        Some(format!(
                            "Exercise caution with improvements of {key} due to high historical failure rate."
                        ))
                    }
                    _ => None,
                }
            })
            .collect()
    }

    async fn metrics(&self) -> DomainResult<LearningMetrics> {
        let all = self.repository.list(&ProposalFilter::default()).await?;
        if all.is_empty() {
            return Ok(LearningMetrics::default());
        }

        let mut successful = 0u32;
        let mut auto_approved = 0u32;
        let mut confidence_sum = 0f64;
        let mut confidence_count = 0u32;
        for p in &all {
            if p.is_success() {
                successful += 1;
            }
            if self.was_auto_approved(p).await? {
                auto_approved += 1;
            }
            if let Some(score) = p.confidence_score {
                confidence_sum += f64::from(score);
                confidence_count += 1;
            }
        }

        let total = all.len() as u32;
        Ok(LearningMetrics {
            total_improvements: total,
            success_rate: f64::from(successful) / f64::from(total),
            auto_approval_rate: f64::from(auto_approved) / f64::from(total),
            average_confidence_score: if confidence_count == 0 {
                0.0
            } else {
                confidence_sum / f64::from(confidence_count)
            },
        })
    }

    async fn was_auto_approved(&self, proposal: &ImprovementProposal) -> DomainResult<bool> {
        if proposal.outcome == Some(ProposalOutcome::AutoApproved) {
            return Ok(true);
        }
        if matches!(proposal.status, ProposalStatus::Planned | ProposalStatus::PendingReview) {
            return Ok(false);
        }
        Ok(self
            .repository
            .active_decision(proposal.id)
            .await?
            .is_some_and(|d| d.action == DecisionAction::AutoApprove))
    }
}

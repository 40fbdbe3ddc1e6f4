//! Proposal lifecycle commands.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};

use crate::cli::commands::{format_time, open_api, parse_status, parse_trigger};
use crate::cli::id_resolver::resolve_proposal_id;
use crate::cli::output::{detail_table, list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{
    CodeQualityMetrics, Config, DecisionResult, ImprovementProposal, NewProposal,
    ProposalRevision, TriggerContext,
};
use crate::domain::ports::ProposalFilter;

#[derive(Args, Debug)]
pub struct ProposalArgs {
    #[command(subcommand)]
    pub command: ProposalCommands,
}

/// Static checks that passed for a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QualityCheck {
    Lint,
    Types,
    Security,
    /// Checks ran and none passed
    None,
}

#[derive(Args, Debug, Default)]
pub struct ChangeArgs {
    /// Files touched by the change (repeatable)
    #[arg(long = "file")]
    pub files: Vec<String>,
    /// Modules touched by the change (repeatable)
    #[arg(long = "module")]
    pub modules: Vec<String>,
    /// Lines changed
    #[arg(long)]
    pub lines: Option<u32>,
    /// Predicted test coverage, 0-100
    #[arg(long)]
    pub coverage: Option<f64>,
    /// Generator confidence, 0-1
    #[arg(long)]
    pub llm_confidence: Option<f64>,
    /// Static checks that passed (comma separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub quality: Option<Vec<QualityCheck>>,
}

impl ChangeArgs {
    fn code_quality(&self) -> Option<CodeQualityMetrics> {
        self.quality.as_ref().map(|checks| CodeQualityMetrics {
            lint_passed: checks.contains(&QualityCheck::Lint),
            type_check_passed: checks.contains(&QualityCheck::Types),
            security_scan_passed: checks.contains(&QualityCheck::Security),
        })
    }

    fn set_or_none(values: &[String]) -> Option<BTreeSet<String>> {
        (!values.is_empty()).then(|| values.iter().cloned().collect())
    }
}

#[derive(Subcommand, Debug)]
pub enum ProposalCommands {
    /// Register a new proposal
    Create {
        /// Trigger type (routine_audit, minor_feedback, performance_issue, ...)
        #[arg(long)]
        trigger: String,
        /// What is wrong
        #[arg(long)]
        problem: String,
        /// How the change fixes it
        #[arg(long, default_value = "")]
        solution: String,
        /// Who asked for the change
        #[arg(long)]
        requested_by: Option<String>,
        #[command(flatten)]
        change: ChangeArgs,
    },
    /// List proposals
    List {
        /// Filter by status (repeatable)
        #[arg(short, long)]
        status: Vec<String>,
        /// Filter by trigger type
        #[arg(short, long)]
        trigger: Option<String>,
        /// Maximum number of proposals to show
        #[arg(short, long, default_value_t = 50)]
        limit: u32,
    },
    /// Show proposal details and decision history
    Show {
        /// Proposal ID or unique prefix
        id: String,
    },
    /// Replace the change content of an undecided proposal
    Revise {
        /// Proposal ID or unique prefix
        id: String,
        /// New solution approach
        #[arg(long)]
        solution: Option<String>,
        #[command(flatten)]
        change: ChangeArgs,
    },
    /// Approve a proposal waiting for review
    Approve {
        /// Proposal ID or unique prefix
        id: String,
        #[arg(long)]
        reviewer: Option<String>,
    },
    /// Reject a proposal waiting for review
    Reject {
        /// Proposal ID or unique prefix
        id: String,
        #[arg(long)]
        reviewer: Option<String>,
    },
    /// Record the pull request that merged an approved proposal
    Merged {
        /// Proposal ID or unique prefix
        id: String,
        /// Pull request number
        #[arg(long)]
        pr: u64,
        /// Merge commit sha
        #[arg(long)]
        sha: String,
    },
    /// Mark a merged proposal as fully deployed
    Deployed {
        /// Proposal ID or unique prefix
        id: String,
    },
    /// Record whether a shipped proposal worked
    Outcome {
        /// Proposal ID or unique prefix
        id: String,
        #[arg(long, value_enum)]
        result: OutcomeArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutcomeArg {
    Success,
    Failure,
}

#[derive(Debug, serde::Serialize)]
pub struct ProposalSummary {
    pub id: String,
    pub trigger_type: String,
    pub status: String,
    pub risk_level: Option<String>,
    pub risk_score: Option<u8>,
    pub confidence_score: Option<u8>,
    pub problem_statement: String,
    pub created_at: String,
}

impl From<&ImprovementProposal> for ProposalSummary {
    fn from(p: &ImprovementProposal) -> Self {
        Self {
            id: p.id.to_string(),
            trigger_type: p.trigger_type.to_string(),
            status: p.status.to_string(),
            risk_level: p.risk_level.map(|l| l.to_string()),
            risk_score: p.risk_score,
            confidence_score: p.confidence_score,
            problem_statement: p.problem_statement.clone(),
            created_at: format_time(p.created_at),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ProposalListOutput {
    pub proposals: Vec<ProposalSummary>,
    pub total: usize,
}

impl CommandOutput for ProposalListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "status", "trigger", "risk", "confidence", "problem"]);
        for p in &self.proposals {
            table.add_row(vec![
                p.id[..8].to_string(),
                p.status.clone(),
                p.trigger_type.clone(),
                match (&p.risk_level, p.risk_score) {
                    (Some(level), Some(score)) => format!("{level} ({score})"),
                    (Some(level), None) => level.clone(),
                    _ => "-".to_string(),
                },
                p.confidence_score.map_or_else(|| "-".to_string(), |c| format!("{c}%")),
                truncate(&p.problem_statement, 48),
            ]);
        }
        render_list("proposal", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ProposalDetailOutput {
    pub proposal: ImprovementProposal,
    pub decisions: Vec<DecisionResult>,
}

impl CommandOutput for ProposalDetailOutput {
    fn to_human(&self) -> String {
        let p = &self.proposal;
        let mut rows = vec![
            ("ID", p.id.to_string()),
            ("Status", p.status.to_string()),
            ("Trigger", p.trigger_type.to_string()),
            ("Problem", p.problem_statement.clone()),
            ("Revision", p.revision.to_string()),
            ("Lines changed", p.lines_changed.to_string()),
        ];
        if !p.solution_approach.is_empty() {
            rows.push(("Solution", p.solution_approach.clone()));
        }
        if !p.affected_modules.is_empty() {
            rows.push(("Modules", join(&p.affected_modules)));
        }
        if !p.files_changed.is_empty() {
            rows.push(("Files", join(&p.files_changed)));
        }
        if let TriggerContext::AutoHealing { issue_id, severity, .. } = &p.trigger_context {
            rows.push(("Health issue", format!("{issue_id} ({severity})")));
        }
        if let Some(risk) = &p.risk_analysis {
            rows.push(("Risk", format!("{} ({})", risk.risk_level, risk.risk_score)));
        } else if let Some(level) = p.risk_level {
            rows.push(("Risk", format!("{level} (seeded)")));
        }
        if let Some(confidence) = &p.confidence_scoring {
            rows.push((
                "Confidence",
                format!(
                    "{}% ({})",
                    confidence.confidence_score,
                    confidence.recommendation.as_str()
                ),
            ));
        }
        if let Some(outcome) = p.outcome {
            rows.push(("Outcome", outcome.as_str().to_string()));
        }
        if let Some(branch) = &p.branch_name {
            rows.push(("Branch", branch.clone()));
        }
        if let Some(pr) = p.pr_number {
            rows.push(("Pull request", format!("#{pr}")));
        }
        if let Some(canary) = &p.canary {
            rows.push((
                "Canary",
                format!(
                    "{}% for {} min since {}",
                    canary.target_percentage,
                    canary.duration_minutes,
                    format_time(canary.started_at)
                ),
            ));
        }
        rows.push(("Created", format_time(p.created_at)));
        if let Some(at) = p.deployed_at {
            rows.push(("Deployed", format_time(at)));
        }
        if let Some(at) = p.completed_at {
            rows.push(("Completed", format_time(at)));
        }

        let mut out = detail_table(&rows).to_string();
        if !self.decisions.is_empty() {
            out.push_str("\n\nDecisions:");
            for d in &self.decisions {
                out.push_str(&format!(
                    "\n  {} rev {} {}{}: {}",
                    format_time(d.decided_at),
                    d.proposal_revision,
                    d.action,
                    if d.active { " (active)" } else { "" },
                    d.reasoning
                ));
            }
        }
        out
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[derive(Debug, serde::Serialize)]
pub struct ProposalActionOutput {
    pub success: bool,
    pub message: String,
    pub proposal: ProposalSummary,
}

impl CommandOutput for ProposalActionOutput {
    fn to_human(&self) -> String {
        format!(
            "{}\n  ID: {}\n  Status: {}",
            self.message, self.proposal.id, self.proposal.status
        )
    }
}

fn action(message: impl Into<String>, proposal: &ImprovementProposal) -> ProposalActionOutput {
    ProposalActionOutput {
        success: true,
        message: message.into(),
        proposal: ProposalSummary::from(proposal),
    }
}

pub async fn execute(args: ProposalArgs, config: &Config, json_mode: bool) -> Result<()> {
    let api = open_api(config).await?;

    match args.command {
        ProposalCommands::Create {
            trigger,
            problem,
            solution,
            requested_by,
            change,
        } => {
            let input = NewProposal {
                trigger_type: Some(parse_trigger(&trigger)?),
                trigger_context: TriggerContext::External { requested_by },
                problem_statement: problem,
                solution_approach: solution,
                files_changed: change.files.iter().cloned().collect(),
                lines_changed: change.lines.unwrap_or(0),
                affected_modules: change.modules.iter().cloned().collect(),
                test_coverage: change.coverage,
                llm_confidence: change.llm_confidence,
                code_quality: change.code_quality(),
                ..Default::default()
            };
            let proposal = api
                .create_proposal(input)
                .await
                .context("Failed to create proposal")?;
            output(&action("Proposal created.", &proposal), json_mode);
        }
        ProposalCommands::List {
            status,
            trigger,
            limit,
        } => {
            let filter = ProposalFilter {
                statuses: status
                    .iter()
                    .map(|s| parse_status(s))
                    .collect::<Result<_>>()?,
                trigger_type: trigger.as_deref().map(parse_trigger).transpose()?,
                limit: Some(limit),
                ..Default::default()
            };
            let proposals = api.list(&filter).await.context("Failed to list proposals")?;
            let list = ProposalListOutput {
                total: proposals.len(),
                proposals: proposals.iter().map(ProposalSummary::from).collect(),
            };
            output(&list, json_mode);
        }
        ProposalCommands::Show { id } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let proposal = api.get(id).await?;
            let decisions = api.decisions(id).await?;
            output(&ProposalDetailOutput { proposal, decisions }, json_mode);
        }
        ProposalCommands::Revise {
            id,
            solution,
            change,
        } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let revision = ProposalRevision {
                solution_approach: solution,
                files_changed: ChangeArgs::set_or_none(&change.files),
                lines_changed: change.lines,
                affected_modules: ChangeArgs::set_or_none(&change.modules),
                test_coverage: change.coverage,
                llm_confidence: change.llm_confidence,
                code_quality: change.code_quality(),
            };
            let proposal = api.revise_proposal(id, revision).await?;
            output(
                &action(
                    format!("Proposal revised to revision {}. Previous scores were discarded.", proposal.revision),
                    &proposal,
                ),
                json_mode,
            );
        }
        ProposalCommands::Approve { id, reviewer } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let proposal = api.approve(id, reviewer.as_deref()).await?;
            output(&action("Proposal approved.", &proposal), json_mode);
        }
        ProposalCommands::Reject { id, reviewer } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let proposal = api.reject(id, reviewer.as_deref()).await?;
            output(&action("Proposal rejected.", &proposal), json_mode);
        }
        ProposalCommands::Merged { id, pr, sha } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let proposal = api.record_merge(id, pr, &sha).await?;
            output(&action(format!("Merge via PR #{pr} recorded."), &proposal), json_mode);
        }
        ProposalCommands::Deployed { id } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let proposal = api.mark_deployed(id).await?;
            output(&action("Proposal marked as deployed.", &proposal), json_mode);
        }
        ProposalCommands::Outcome { id, result } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let proposal = api
                .record_outcome(id, result == OutcomeArg::Success)
                .await?;
            output(&action("Outcome recorded.", &proposal), json_mode);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_checks_map_to_metrics() {
        let change = ChangeArgs {
            quality: Some(vec![QualityCheck::Lint, QualityCheck::Security]),
            ..Default::default()
        };
        let quality = change.code_quality().unwrap();
        assert!(quality.lint_passed);
        assert!(!quality.type_check_passed);
        assert!(quality.security_scan_passed);

        let none = ChangeArgs {
            quality: Some(vec![QualityCheck::None]),
            ..Default::default()
        };
        assert_eq!(
            none.code_quality(),
            Some(CodeQualityMetrics {
                lint_passed: false,
                type_check_passed: false,
                security_scan_passed: false,
            })
        );
        assert_eq!(ChangeArgs::default().code_quality(), None);
    }

    #[test]
    fn test_empty_revision_sets_stay_unchanged() {
        assert_eq!(ChangeArgs::set_or_none(&[]), None);
        assert_eq!(
            ChangeArgs::set_or_none(&["api".to_string(), "api".to_string()]).map(|s| s.len()),
            Some(1)
        );
    }
}

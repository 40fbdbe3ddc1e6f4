//! Scoring and decision commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::commands::open_api;
use crate::cli::id_resolver::resolve_proposal_id;
use crate::cli::output::{detail_table, output, CommandOutput};
use crate::domain::models::{
    Config, ConfidenceScoringResult, DecisionResult, RiskAnalysisResult,
};
use crate::services::Evaluation;

#[derive(Args, Debug)]
pub struct AssessArgs {
    #[command(subcommand)]
    pub command: AssessCommands,
}

#[derive(Subcommand, Debug)]
pub enum AssessCommands {
    /// Compute and store the risk analysis
    Risk {
        /// Proposal ID or unique prefix
        id: String,
    },
    /// Compute and store the confidence score
    Confidence {
        /// Proposal ID or unique prefix
        id: String,
    },
    /// Decide from the stored risk and confidence results
    Decide {
        /// Proposal ID or unique prefix
        id: String,
    },
    /// Score and decide in one pass
    Evaluate {
        /// Proposal ID or unique prefix
        id: String,
    },
}

impl CommandOutput for RiskAnalysisResult {
    fn to_human(&self) -> String {
        let f = &self.factors;
        let table = detail_table(&[
            ("Risk", format!("{} ({}/100)", self.risk_level, self.risk_score)),
            ("Trigger", f.trigger_risk.to_string()),
            ("Complexity", f.complexity_risk.to_string()),
            ("Impact", f.impact_risk.to_string()),
            ("Historical", f.historical_risk.to_string()),
            ("Revision", self.revision.to_string()),
        ]);
        format!("{table}\n\n{}", self.reasoning)
    }
}

impl CommandOutput for ConfidenceScoringResult {
    fn to_human(&self) -> String {
        let f = &self.factors;
        let table = detail_table(&[
            ("Confidence", format!("{}%", self.confidence_score)),
            ("Recommendation", self.recommendation.as_str().to_string()),
            ("LLM confidence", f.llm_confidence.to_string()),
            ("Test coverage", f.test_coverage.to_string()),
            ("Historical success", f.historical_success.to_string()),
            ("Code quality", f.code_quality.to_string()),
            ("Revision", self.revision.to_string()),
        ]);
        format!("{table}\n\n{}", self.reasoning)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct DecisionOutput {
    pub proposal_id: String,
    pub status: String,
    pub decision: DecisionResult,
}

impl From<Evaluation> for DecisionOutput {
    fn from(eval: Evaluation) -> Self {
        Self {
            proposal_id: eval.proposal.id.to_string(),
            status: eval.proposal.status.to_string(),
            decision: eval.decision,
        }
    }
}

impl CommandOutput for DecisionOutput {
    fn to_human(&self) -> String {
        let d = &self.decision;
        let table = detail_table(&[
            ("Decision", d.action.to_string()),
            ("Status", self.status.clone()),
            ("Risk", format!("{} ({})", d.risk_level, d.risk_score)),
            ("Confidence", format!("{}%", d.confidence_score)),
            ("Revision", d.proposal_revision.to_string()),
        ]);
        format!("{table}\n\n{}", d.reasoning)
    }
}

pub async fn execute(args: AssessArgs, config: &Config, json_mode: bool) -> Result<()> {
    let api = open_api(config).await?;

    match args.command {
        AssessCommands::Risk { id } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let result = api.analyze_risk(id).await.context("Risk analysis failed")?;
            output(&result, json_mode);
        }
        AssessCommands::Confidence { id } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let result = api
                .score_confidence(id)
                .await
                .context("Confidence scoring failed")?;
            output(&result, json_mode);
        }
        AssessCommands::Decide { id } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let eval = api.decide(id).await.context("Decision failed")?;
            output(&DecisionOutput::from(eval), json_mode);
        }
        AssessCommands::Evaluate { id } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let eval = api.evaluate(id).await.context("Evaluation failed")?;
            output(&DecisionOutput::from(eval), json_mode);
        }
    }

    Ok(())
}

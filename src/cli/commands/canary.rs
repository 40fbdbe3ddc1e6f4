//! Canary deployment commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::commands::{format_time, open_api};
use crate::cli::id_resolver::resolve_proposal_id;
use crate::cli::output::{detail_table, output, CommandOutput};
use crate::domain::models::{CanaryEvaluation, CanaryRequest, Config, SuccessCriteria};

#[derive(Args, Debug)]
pub struct CanaryArgs {
    #[command(subcommand)]
    pub command: CanaryCommands,
}

#[derive(Subcommand, Debug)]
pub enum CanaryCommands {
    /// Start a canary rollout of a merged proposal
    Start {
        /// Proposal ID or unique prefix
        id: String,
        /// Share of traffic routed to the canary (1-100)
        #[arg(long)]
        percentage: Option<u8>,
        /// Observation window in minutes
        #[arg(long)]
        duration: Option<u32>,
        /// Highest acceptable error rate (0-1)
        #[arg(long)]
        max_error_rate: Option<f64>,
        /// Lowest acceptable success rate (0-1)
        #[arg(long)]
        min_success_rate: Option<f64>,
    },
    /// Evaluate a running canary against its criteria
    Status {
        /// Proposal ID or unique prefix
        id: String,
    },
    /// Promote a canary to a full deployment
    Promote {
        /// Proposal ID or unique prefix
        id: String,
    },
}

impl CommandOutput for CanaryEvaluation {
    fn to_human(&self) -> String {
        let mut rows = vec![
            ("Proceed", if self.should_proceed { "yes" } else { "no" }.to_string()),
            ("Reason", self.reason.clone()),
            (
                "Window elapsed",
                if self.window_elapsed { "yes" } else { "no" }.to_string(),
            ),
        ];
        if let Some(m) = &self.metrics {
            rows.push(("Error rate", format!("{:.4}", m.error_rate)));
            rows.push(("Success rate", format!("{:.4}", m.success_rate)));
            rows.push(("Samples", m.sample_size.to_string()));
        }
        rows.push(("Evaluated", format_time(self.evaluated_at)));
        detail_table(&rows).to_string()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CanaryActionOutput {
    pub success: bool,
    pub message: String,
    pub proposal_id: String,
    pub status: String,
}

impl CommandOutput for CanaryActionOutput {
    fn to_human(&self) -> String {
        format!("{}\n  ID: {}\n  Status: {}", self.message, self.proposal_id, self.status)
    }
}

pub async fn execute(args: CanaryArgs, config: &Config, json_mode: bool) -> Result<()> {
    let api = open_api(config).await?;

    match args.command {
        CanaryCommands::Start {
            id,
            percentage,
            duration,
            max_error_rate,
            min_success_rate,
        } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let defaults = config.canary.default_request();
            let request = CanaryRequest {
                target_percentage: percentage.unwrap_or(defaults.target_percentage),
                duration_minutes: duration.unwrap_or(defaults.duration_minutes),
                success_criteria: SuccessCriteria {
                    max_error_rate: max_error_rate
                        .unwrap_or(defaults.success_criteria.max_error_rate),
                    min_success_rate: min_success_rate
                        .unwrap_or(defaults.success_criteria.min_success_rate),
                },
            };
            let proposal = api
                .start_canary(id, Some(request))
                .await
                .context("Failed to start canary")?;
            output(
                &CanaryActionOutput {
                    success: true,
                    message: format!(
                        "Canary started at {}% for {} minutes.",
                        request.target_percentage, request.duration_minutes
                    ),
                    proposal_id: proposal.id.to_string(),
                    status: proposal.status.to_string(),
                },
                json_mode,
            );
        }
        CanaryCommands::Status { id } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let evaluation = api.canary_status(id).await?;
            output(&evaluation, json_mode);
        }
        CanaryCommands::Promote { id } => {
            let id = resolve_proposal_id(&api, &id).await?;
            let proposal = api.promote_canary(id).await?;
            output(
                &CanaryActionOutput {
                    success: true,
                    message: "Canary promoted to full deployment.".to_string(),
                    proposal_id: proposal.id.to_string(),
                    status: proposal.status.to_string(),
                },
                json_mode,
            );
        }
    }

    Ok(())
}

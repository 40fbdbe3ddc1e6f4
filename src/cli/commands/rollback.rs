//! Implementation of the `autopilot rollback` command.

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::commands::open_api;
use crate::cli::id_resolver::resolve_proposal_id;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, RollbackResult};

#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Proposal ID or unique prefix
    pub id: String,
}

impl CommandOutput for RollbackResult {
    fn to_human(&self) -> String {
        let mut lines = vec![if self.success {
            format!("Rollback succeeded: {}", self.message)
        } else {
            format!("Rollback failed: {}", self.message)
        }];
        if let Some(pr) = self.revert_pr_number {
            lines.push(format!("  Revert PR: #{pr}"));
        }
        if let Some(sha) = &self.revert_commit_sha {
            lines.push(format!("  Revert commit: {sha}"));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RollbackArgs, config: &Config, json_mode: bool) -> Result<()> {
    let api = open_api(config).await?;
    let id = resolve_proposal_id(&api, &args.id).await?;
    let result = api.rollback(id).await.context("Rollback could not start")?;
    output(&result, json_mode);
    if result.success {
        Ok(())
    } else {
        anyhow::bail!("rollback of {id} did not complete")
    }
}

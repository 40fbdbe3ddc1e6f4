//! Implementation of the `autopilot health` command.

use anyhow::Result;
use clap::Args;

use crate::cli::commands::open_api;
use crate::cli::output::{list_table, output, truncate, CommandOutput};
use crate::domain::models::Config;
use crate::services::HealthCycleReport;

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Open auto-fix proposals for high and critical issues
    #[arg(long)]
    pub auto_fix: bool,
}

impl CommandOutput for HealthCycleReport {
    fn to_human(&self) -> String {
        let mut out = if self.check.healthy {
            "System is healthy.".to_string()
        } else {
            "System is unhealthy.".to_string()
        };

        if !self.check.issues.is_empty() {
            let mut table = list_table(&["SEVERITY", "KIND", "DESCRIPTION"]);
            for issue in &self.check.issues {
                table.add_row(vec![
                    issue.severity.to_string(),
                    issue.kind.label().to_string(),
                    truncate(&issue.description, 70),
                ]);
            }
            out.push_str(&format!("\n\n{table}"));
        }

        if !self.created.is_empty() {
            out.push_str("\n\nAuto-fix proposals created:");
            for id in &self.created {
                out.push_str(&format!("\n  - {id}"));
            }
        }
        out
    }
}

pub async fn execute(args: HealthArgs, config: &Config, json_mode: bool) -> Result<()> {
    let api = open_api(config).await?;
    let report = api.health_check(args.auto_fix).await;
    output(&report, json_mode);
    Ok(())
}

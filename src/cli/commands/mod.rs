//! CLI command implementations.

pub mod assess;
pub mod canary;
pub mod health;
pub mod init;
pub mod learning;
pub mod proposal;
pub mod rollback;
pub mod serve;

use anyhow::{bail, Context, Result};

use crate::application::{AppContext, AutonomyApi};
use crate::domain::models::{Config, ProposalStatus, TriggerType};

/// Open the configured store and collaborators.
pub async fn open_api(config: &Config) -> Result<AutonomyApi> {
    let ctx = AppContext::from_config(config.clone())
        .await
        .context("Failed to initialize autopilot. Did you run 'autopilot init'?")?;
    Ok(AutonomyApi::new(&ctx))
}

pub(crate) fn parse_trigger(s: &str) -> Result<TriggerType> {
    match TriggerType::from_str(s) {
        TriggerType::Unknown => {
            let known: Vec<_> = TriggerType::ALL.iter().map(TriggerType::as_str).collect();
            bail!("Unknown trigger type '{s}'. Expected one of: {}", known.join(", "))
        }
        trigger => Ok(trigger),
    }
}

pub(crate) fn parse_status(s: &str) -> Result<ProposalStatus> {
    ProposalStatus::from_str(s).with_context(|| format!("Unknown proposal status '{s}'"))
}

pub(crate) fn format_time(t: chrono::DateTime<chrono::Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

//! Implementation of the `autopilot serve` command.

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::commands::open_api;
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Report canary breaches without reverting them
    #[arg(long)]
    pub no_auto_rollback: bool,

    /// Detect health issues without opening auto-fix proposals
    #[arg(long)]
    pub no_auto_fix: bool,
}

pub async fn execute(args: ServeArgs, config: &Config) -> Result<()> {
    let mut config = config.clone();
    if args.no_auto_rollback {
        config.canary.auto_rollback = false;
    }
    if args.no_auto_fix {
        config.monitor.auto_fix_enabled = false;
    }

    let api = open_api(&config).await?;
    let scheduler = api.scheduler();
    scheduler
        .start()
        .await
        .context("Failed to start background loops")?;
    tracing::info!(
        auto_rollback = config.canary.auto_rollback,
        auto_fix = config.monitor.auto_fix_enabled,
        "autopilot running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutdown requested");
    scheduler.stop().await;
    Ok(())
}

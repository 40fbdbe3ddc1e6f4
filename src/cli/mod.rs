//! Command-line interface.

pub mod commands;
pub mod id_resolver;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{
    assess::AssessArgs, canary::CanaryArgs, health::HealthArgs, init::InitArgs,
    proposal::ProposalArgs, rollback::RollbackArgs, serve::ServeArgs,
};

#[derive(Parser, Debug)]
#[command(name = "autopilot")]
#[command(about = "Autonomous improvement decision pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .autopilot/
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize autopilot in the current project
    Init(InitArgs),
    /// Create, inspect and move proposals through their lifecycle
    Proposal(ProposalArgs),
    /// Score and decide proposals
    Assess(AssessArgs),
    /// Revert a merged proposal
    Rollback(RollbackArgs),
    /// Canary deployments
    Canary(CanaryArgs),
    /// Run the health checks
    Health(HealthArgs),
    /// Mine historical proposals for patterns
    Learning,
    /// Run the health, canary and learning loops until interrupted
    Serve(ServeArgs),
}

/// Print `err` in the selected format and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_json_after_subcommand() {
        let cli = Cli::try_parse_from(["autopilot", "health", "--auto-fix", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Health(args) => assert!(args.auto_fix),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_proposal_create() {
        let cli = Cli::try_parse_from([
            "autopilot",
            "proposal",
            "create",
            "--trigger",
            "routine_audit",
            "--problem",
            "Clarify setup docs",
            "--file",
            "docs/setup.md",
            "--module",
            "docs",
            "--lines",
            "20",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Proposal(_)));
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        assert!(Cli::try_parse_from(["autopilot", "deploy-everything"]).is_err());
    }
}

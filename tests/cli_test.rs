//! CLI parsing and command execution against a scratch project directory.

use autopilot::cli::commands::canary::{CanaryArgs, CanaryCommands};
use autopilot::cli::commands::init::{self, InitArgs};
use autopilot::cli::commands::proposal::{self, ProposalArgs, ProposalCommands};
use autopilot::cli::{Cli, Commands};
use autopilot::domain::models::{ProposalStatus, TriggerType};
use autopilot::{AppContext, AutonomyApi, Config, ConfigLoader};
use clap::Parser;
use tempfile::TempDir;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("autopilot").chain(args.iter().copied()))
        .expect("arguments should parse")
}

#[test]
fn test_parse_canary_start_overrides() {
    let cli = parse(&[
        "canary",
        "start",
        "1a2b3c4d",
        "--percentage",
        "25",
        "--max-error-rate",
        "0.02",
    ]);
    match cli.command {
        Commands::Canary(CanaryArgs {
            command:
                CanaryCommands::Start {
                    id,
                    percentage,
                    duration,
                    max_error_rate,
                    ..
                },
        }) => {
            assert_eq!(id, "1a2b3c4d");
            assert_eq!(percentage, Some(25));
            assert_eq!(duration, None);
            assert_eq!(max_error_rate, Some(0.02));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_parse_config_flag_and_serve_overrides() {
    let cli = parse(&["--config", "ops/autopilot.yaml", "serve", "--no-auto-rollback"]);
    assert_eq!(
        cli.config.as_deref(),
        Some(std::path::Path::new("ops/autopilot.yaml"))
    );
    match cli.command {
        Commands::Serve(args) => {
            assert!(args.no_auto_rollback);
            assert!(!args.no_auto_fix);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_parse_quality_list() {
    let cli = parse(&[
        "proposal",
        "create",
        "--trigger",
        "routine_audit",
        "--problem",
        "typo",
        "--quality",
        "lint,types",
    ]);
    let Commands::Proposal(ProposalArgs {
        command: ProposalCommands::Create { change, .. },
    }) = cli.command
    else {
        panic!("expected proposal create");
    };
    assert_eq!(change.quality.map(|q| q.len()), Some(2));
}

#[test]
fn test_rejects_out_of_range_percentage() {
    let result = Cli::try_parse_from(["autopilot", "canary", "start", "abc", "--percentage", "300"]);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_init_then_create_proposal() {
    let dir = TempDir::new().unwrap();
    init::execute(
        InitArgs {
            force: false,
            path: dir.path().to_path_buf(),
        },
        true,
    )
    .await
    .unwrap();

    let mut config: Config =
        ConfigLoader::load_from_file(dir.path().join(".autopilot/config.yaml")).unwrap();
    config.database.path = dir
        .path()
        .join(".autopilot/autopilot.db")
        .display()
        .to_string();

    let cli = parse(&[
        "proposal",
        "create",
        "--trigger",
        "minor_feedback",
        "--problem",
        "Button label is unclear",
        "--file",
        "web/src/checkout.tsx",
        "--module",
        "web",
        "--lines",
        "4",
    ]);
    let Commands::Proposal(args) = cli.command else {
        panic!("expected proposal command");
    };
    proposal::execute(args, &config, true).await.unwrap();

    let ctx = AppContext::from_config(config).await.unwrap();
    let api = AutonomyApi::new(&ctx);
    let proposals = api.list(&Default::default()).await.unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].trigger_type, TriggerType::MinorFeedback);
    assert_eq!(proposals[0].status, ProposalStatus::Planned);
    assert_eq!(proposals[0].lines_changed, 4);
}

#[tokio::test]
async fn test_unknown_trigger_is_refused() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.database.path = dir.path().join("autopilot.db").display().to_string();

    let cli = parse(&[
        "proposal",
        "create",
        "--trigger",
        "gut_feeling",
        "--problem",
        "Something seems off",
    ]);
    let Commands::Proposal(args) = cli.command else {
        panic!("expected proposal command");
    };
    let err = proposal::execute(args, &config, true).await.unwrap_err();
    assert!(err.to_string().contains("gut_feeling"));
}

//! Autopilot CLI entry point.

use clap::Parser;

use autopilot::cli::commands::{
    assess, canary, health, init, learning, proposal, rollback, serve,
};
use autopilot::cli::{handle_error, Cli, Commands};
use autopilot::infrastructure::config::ConfigLoader;
use autopilot::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .unwrap_or_else(|err| handle_error(err, json));

    // Held for the whole run so buffered file logs are flushed on exit.
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))
        .unwrap_or_else(|err| handle_error(err, json));

    let result = match cli.command {
        Commands::Init(args) => init::execute(args, json).await,
        Commands::Proposal(args) => proposal::execute(args, &config, json).await,
        Commands::Assess(args) => assess::execute(args, &config, json).await,
        Commands::Rollback(args) => rollback::execute(args, &config, json).await,
        Commands::Canary(args) => canary::execute(args, &config, json).await,
        Commands::Health(args) => health::execute(args, &config, json).await,
        Commands::Learning => learning::execute(&config, json).await,
        Commands::Serve(args) => serve::execute(args, &config).await,
    };

    if let Err(err) = result {
        handle_error(err, json);
    }
}

//! # replay-sim
//!
//! Command-line entry point.
//!
//! - configuration loading and validation
//! - simulation run with sinks and metrics
//! - graceful shutdown on Ctrl+C / SIGTERM

mod cli;
mod commands;
mod error;

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_simulation, run_validate};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = observability::init_logging(cli.log_format.into(), &cli.log_level) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "replay-sim starting");

    let result = match &cli.command {
        Commands::Run(args) => run_simulation(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "command failed");
            ExitCode::from(error::exit_code(&e))
        }
    }
}

//! dynastate CLI
//!
//! Command-line front end for the state manager and guard pipeline

use clap::{Parser, Subcommand};
use dyna_store::logging_facility::{init, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "dyna")]
#[command(about = "dynastate - layered state management and guard pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// State operations against the durable local layer
    State(commands::state::StateArgs),
    /// Credential and guard-pipeline operations
    Guard(commands::guard::GuardArgs),
}

#[tokio::main]
async fn main() {
    init(Profile::Development);

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::State(args) => commands::state::execute(args).await,
        Commands::Guard(args) => commands::guard::execute(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

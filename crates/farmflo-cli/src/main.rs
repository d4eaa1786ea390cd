//! FarmFlo CLI - drive the marketplace core from the terminal
//!
//! Runs the end-to-end marketplace scenario against in-memory backends, filters
//! listing snapshots the way the directory view does, and checks client
//! configuration.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::commands::config::run_config_check;
use crate::commands::demo::run_demo;
use crate::commands::search::run_search;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("farmflo=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo { json } => run_demo(json).await?,
        Commands::Search {
            query,
            snapshot,
            json,
        } => run_search(&query, &snapshot, json)?,
        Commands::Config {
            command: ConfigCommands::Check { json },
        } => run_config_check(json)?,
    }

    Ok(())
}

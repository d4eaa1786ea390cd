use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "farmflo")]
#[command(about = "Live crop marketplace client")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a seller/buyer session against an in-memory store
    Demo {
        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Filter a listing snapshot by name
    Search {
        /// Case-insensitive name fragment; empty matches everything
        #[arg(default_value = "")]
        query: String,
        /// JSON file holding an array of crop documents
        #[arg(long, value_name = "PATH")]
        snapshot: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect client configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Report which FARMFLO_* settings are present
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

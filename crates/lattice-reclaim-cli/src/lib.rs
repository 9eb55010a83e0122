//! lattice-reclaim CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// lattice-reclaim - delete the cloud resources a cluster left behind
#[derive(Parser, Debug)]
#[command(name = "lattice-reclaim")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit logs as JSON
    #[arg(long, env = "LATTICE_LOG_JSON", global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show what would be deleted, and in which round
    Plan(commands::plan::PlanArgs),
    /// Delete every resource the cluster owns
    Delete(commands::delete::DeleteArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Plan(args) => commands::plan::run(args).await,
            Commands::Delete(args) => commands::delete::run(args).await,
        }
    }
}

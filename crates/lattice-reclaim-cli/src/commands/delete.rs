//! Delete command - remove every resource a cluster owns
//!
//! Usage: lattice-reclaim delete --cluster <name> --resource-group <rg> [--yes]
//!
//! Lists everything tagged for the cluster, then deletes in rounds until
//! nothing deletable remains. Shared resources, and anything they block,
//! are left in place. Safe to re-run after a partial failure.

use std::io::Write;

use clap::Args;
use tokio::io::AsyncBufReadExt;

use super::{execute, RunArgs};
use crate::Result;

/// Delete every resource the cluster owns
#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Skip confirmation prompt
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

pub async fn run(args: DeleteArgs) -> Result<()> {
    if !args.yes && !confirm(&args.run).await? {
        println!("Aborted");
        return Ok(());
    }

    execute(args.run, false).await
}

async fn confirm(run: &RunArgs) -> Result<bool> {
    println!(
        "This will permanently delete every resource owned by cluster '{}'.",
        run.cluster.as_deref().unwrap_or("<from config>")
    );
    print!("Are you sure? [y/N] ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
    reader.read_line(&mut input).await?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

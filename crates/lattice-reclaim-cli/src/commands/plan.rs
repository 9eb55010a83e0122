//! Plan command - show the deletion order without deleting anything
//!
//! Usage: lattice-reclaim plan --cluster <name> --resource-group <rg>

use clap::Args;

use super::{execute, RunArgs};
use crate::Result;

/// Show what would be deleted, and in which round
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

pub async fn run(args: PlanArgs) -> Result<()> {
    execute(args.run, true).await
}

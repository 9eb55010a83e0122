//! CLI commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use lattice_reclaim::{ReclaimReport, Reclaimer};
use lattice_reclaim_azure::azure_listers;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{load_config, resolve, ReclaimConfig};
use crate::Result;

pub mod delete;
pub mod plan;
mod render;

/// Flags shared by `plan` and `delete`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML config file; flags override its values
    #[arg(short, long, env = "LATTICE_RECLAIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cluster name, matched against the ownership tag
    #[arg(long, env = "LATTICE_CLUSTER_NAME")]
    pub cluster: Option<String>,

    /// Ownership tag key (default: KubernetesCluster)
    #[arg(long, env = "LATTICE_TAG_KEY")]
    pub tag_key: Option<String>,

    /// Resource group holding the cluster
    #[arg(long, env = "LATTICE_RESOURCE_GROUP")]
    pub resource_group: Option<String>,

    /// The resource group was not created for this cluster
    #[arg(long, env = "LATTICE_RESOURCE_GROUP_SHARED")]
    pub resource_group_shared: bool,

    /// The virtual network was not created for this cluster
    #[arg(long, env = "LATTICE_NETWORK_SHARED")]
    pub network_shared: bool,

    /// The route table was not created for this cluster
    #[arg(long, env = "LATTICE_ROUTE_TABLE_SHARED")]
    pub route_table_shared: bool,

    /// Azure subscription for every az call
    #[arg(long, env = "LATTICE_AZURE_SUBSCRIPTION")]
    pub subscription: Option<String>,

    /// Path to the az binary
    #[arg(long, env = "LATTICE_AZ_BINARY")]
    pub az_binary: Option<String>,

    /// Failed attempts before a resource is given up on
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Stop after this many deletion rounds
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Timeout for each az call, in seconds
    #[arg(long)]
    pub operation_timeout_secs: Option<u64>,

    /// Deadline for the whole run, in seconds
    #[arg(long, env = "LATTICE_RECLAIM_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Deletions in flight per round
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Fail on duplicate resource keys
    #[arg(long)]
    pub strict: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,
}

/// Output format
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
}

/// Resolve configuration, run the reclaimer and print the report.
///
/// Returns an error for any run whose status is not a success, after the
/// report has been printed.
async fn execute(args: RunArgs, dry_run: bool) -> Result<()> {
    let file = match &args.config {
        Some(path) => load_config(path)?,
        None => ReclaimConfig::default(),
    };
    let run = resolve(&args, file, dry_run)?;

    info!(
        cluster = %run.cluster.name,
        resource_group = %run.info.resource_group_name,
        dry_run,
        "reclaiming cluster resources"
    );

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let reclaimer = Reclaimer::new(azure_listers(Arc::new(run.cloud), run.info));
    let result = reclaimer.reclaim(&run.cluster, &run.options, &cancel).await;
    ctrl_c.abort();
    let report = result?;

    print_report(&report, &args.output)?;
    report.into_result()?;
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, cancelling run");
        cancel.cancel();
    }
}

fn print_report(report: &ReclaimReport, output: &OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Table => render::print_report_table(report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

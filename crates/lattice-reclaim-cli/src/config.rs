//! Run configuration
//!
//! A run is described by a YAML file (`--config`), command-line flags and
//! `LATTICE_*` environment variables. Flags and environment variables win
//! over the file; boolean shared flags can only be switched on from the
//! command line.
//!
//! ```yaml
//! clusterName: prod
//! resourceGroup: prod-rg
//! networkShared: true
//! options:
//!   maxAttempts: 3
//!   timeoutSecs: 1800
//! ```

use std::path::Path;
use std::time::Duration;

use lattice_reclaim::{ClusterIdentity, ReclaimOptions};
use lattice_reclaim_azure::{AzCliCloud, AzureClusterInfo};
use serde::{Deserialize, Serialize};

use crate::commands::RunArgs;
use crate::{Error, Result};

/// Contents of a `--config` file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ReclaimConfig {
    /// Value of the ownership tag
    pub cluster_name: Option<String>,
    /// Ownership tag key
    pub tag_key: Option<String>,
    /// Resource group holding the cluster
    pub resource_group: Option<String>,
    /// The resource group predates the cluster
    pub resource_group_shared: bool,
    /// The network predates the cluster
    pub network_shared: bool,
    /// The route table predates the cluster
    pub route_table_shared: bool,
    /// Azure subscription passed to every `az` call
    pub subscription: Option<String>,
    /// Path to the `az` binary
    pub az_binary: Option<String>,
    /// Orchestrator options
    pub options: ReclaimOptions,
}

/// Load a config file
pub fn load_config(path: &Path) -> Result<ReclaimConfig> {
    let data = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Everything a run needs, after merging file, flags and environment
#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub cluster: ClusterIdentity,
    pub info: AzureClusterInfo,
    pub options: ReclaimOptions,
    pub cloud: AzCliCloud,
}

/// Merge `args` over `file`
pub fn resolve(args: &RunArgs, file: ReclaimConfig, dry_run: bool) -> Result<ResolvedRun> {
    let cluster_name = args
        .cluster
        .clone()
        .or(file.cluster_name)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::validation("cluster name is required (--cluster)"))?;
    let resource_group = args
        .resource_group
        .clone()
        .or(file.resource_group)
        .filter(|rg| !rg.is_empty())
        .ok_or_else(|| Error::validation("resource group is required (--resource-group)"))?;

    let mut cluster = ClusterIdentity::new(cluster_name);
    if let Some(tag_key) = args.tag_key.clone().or(file.tag_key) {
        cluster = cluster.with_tag_key(tag_key);
    }

    let info = AzureClusterInfo::new(resource_group)
        .with_resource_group_shared(args.resource_group_shared || file.resource_group_shared)
        .with_network_shared(args.network_shared || file.network_shared)
        .with_route_table_shared(args.route_table_shared || file.route_table_shared);

    let mut options = file.options.with_dry_run(dry_run);
    if let Some(max_attempts) = args.max_attempts {
        options = options.with_max_attempts(max_attempts);
    }
    if let Some(max_rounds) = args.max_rounds {
        options = options.with_max_rounds(max_rounds);
    }
    if let Some(secs) = args.operation_timeout_secs {
        options = options.with_operation_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.timeout_secs {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    if let Some(concurrency) = args.concurrency {
        options = options.with_concurrency(concurrency);
    }
    if args.strict {
        options = options.with_strict(true);
    }
    options.validate()?;

    let mut cloud = AzCliCloud::new();
    if let Some(binary) = args.az_binary.clone().or(file.az_binary) {
        cloud = cloud.with_binary(binary);
    }
    if let Some(subscription) = args.subscription.clone().or(file.subscription) {
        cloud = cloud.with_subscription(subscription);
    }

    Ok(ResolvedRun {
        cluster,
        info,
        options,
        cloud,
    })
}

//! Azure resource listers for lattice-reclaim
//!
//! Finds everything a cluster owns in its resource group and describes the
//! deletion dependencies between those resources. Ownership is the
//! `KubernetesCluster` tag; subnets and network security groups are untagged
//! and belong to the cluster through their network and resource group.
//!
//! ```text
//! azure_listers(cloud, info) ──► [ResourceLister; 8] ──► lattice_reclaim::Reclaimer
//!                  │
//!                  └── AzureCloud ──► AzCliCloud (az ... -o json)
//! ```

#![deny(missing_docs)]

mod az_cli;
mod cloud;
mod error;
pub mod ids;
mod resources;
pub mod types;

pub use az_cli::{AzCliCloud, DEFAULT_AZ_BINARY};
pub use cloud::AzureCloud;
pub use error::{AzureError, Result};
pub use resources::{
    azure_listers, AzureClusterInfo, AzureKind, AzureLister, DISK, LOAD_BALANCER,
    NETWORK_SECURITY_GROUP, PUBLIC_IP_ADDRESS, RESOURCE_GROUP, ROLE_ASSIGNMENT, ROUTE_TABLE,
    SUBNET, VIRTUAL_NETWORK, VM_SCALE_SET,
};

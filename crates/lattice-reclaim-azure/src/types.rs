//! Azure object models, as emitted by `az ... -o json`
//!
//! Only the fields the listers read are modelled. Everything else in the
//! JSON is ignored.

use std::collections::BTreeMap;

use lattice_reclaim::{normalize_tags, ClusterIdentity};
use serde::{Deserialize, Serialize};

/// Raw ARM tags; values may be null
pub type RawTags = Option<BTreeMap<String, Option<String>>>;

/// Ownership check against raw ARM tags
pub fn owned_by(cluster: &ClusterIdentity, tags: &RawTags) -> bool {
    match tags {
        Some(tags) => cluster.owns(&normalize_tags(tags.clone())),
        None => false,
    }
}

/// Reference to another resource by ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResource {
    /// ARM resource ID
    pub id: String,
}

/// Resource group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroup {
    /// Name
    pub name: String,
    /// Tags
    #[serde(default)]
    pub tags: RawTags,
}

/// Virtual network with its inline subnets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetwork {
    /// Name
    pub name: String,
    /// Tags
    #[serde(default)]
    pub tags: RawTags,
    /// Subnets
    #[serde(default)]
    pub subnets: Vec<Subnet>,
}

/// Subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    /// Name
    pub name: String,
    /// Attached network security group
    #[serde(default)]
    pub network_security_group: Option<SubResource>,
}

/// Network security group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSecurityGroup {
    /// Name
    pub name: String,
    /// Tags
    #[serde(default)]
    pub tags: RawTags,
}

/// Route table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    /// Name
    pub name: String,
    /// Tags
    #[serde(default)]
    pub tags: RawTags,
}

/// Virtual machine scale set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmScaleSet {
    /// Name
    pub name: String,
    /// Tags
    #[serde(default)]
    pub tags: RawTags,
    /// Managed identity
    #[serde(default)]
    pub identity: Option<ManagedIdentity>,
    /// VM template
    #[serde(default)]
    pub virtual_machine_profile: Option<VmProfile>,
}

impl VmScaleSet {
    /// IP configurations across every NIC of the VM template
    pub fn ip_configurations(&self) -> impl Iterator<Item = &IpConfiguration> {
        self.virtual_machine_profile
            .iter()
            .filter_map(|p| p.network_profile.as_ref())
            .flat_map(|n| n.network_interface_configurations.iter())
            .flat_map(|nic| nic.ip_configurations.iter())
    }

    /// Principal of the system-assigned identity
    pub fn principal_id(&self) -> Option<&str> {
        self.identity.as_ref()?.principal_id.as_deref()
    }
}

/// Managed identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedIdentity {
    /// Service principal object ID
    #[serde(default)]
    pub principal_id: Option<String>,
}

/// Scale set VM template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmProfile {
    /// Networking
    #[serde(default)]
    pub network_profile: Option<NetworkProfile>,
}

/// Scale set networking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    /// NIC templates
    #[serde(default)]
    pub network_interface_configurations: Vec<NicConfiguration>,
}

/// NIC template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NicConfiguration {
    /// IP configurations
    #[serde(default)]
    pub ip_configurations: Vec<IpConfiguration>,
}

/// NIC IP configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpConfiguration {
    /// Subnet the NIC attaches to
    #[serde(default)]
    pub subnet: Option<SubResource>,
    /// Load balancer backend pools
    #[serde(default)]
    pub load_balancer_backend_address_pools: Vec<SubResource>,
}

/// Instance of a scale set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmScaleSetVm {
    /// Instance name
    pub name: String,
    /// Disks
    #[serde(default)]
    pub storage_profile: Option<StorageProfile>,
}

impl VmScaleSetVm {
    /// Names of attached data disks
    pub fn data_disk_names(&self) -> impl Iterator<Item = &str> {
        self.storage_profile
            .iter()
            .flat_map(|s| s.data_disks.iter())
            .map(|d| d.name.as_str())
    }
}

/// VM disks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    /// Data disks
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
}

/// Data disk attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDisk {
    /// Disk name
    pub name: String,
}

/// Managed disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    /// Name
    pub name: String,
    /// Tags
    #[serde(default)]
    pub tags: RawTags,
}

/// Role assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    /// Assignment name (a GUID)
    pub name: String,
    /// Scope the role is granted at
    pub scope: String,
    /// Principal the role is granted to
    #[serde(default)]
    pub principal_id: Option<String>,
}

/// Load balancer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// Name
    pub name: String,
    /// Tags
    #[serde(default)]
    pub tags: RawTags,
    /// Frontend IP configurations
    #[serde(default, alias = "frontendIPConfigurations")]
    pub frontend_ip_configurations: Vec<FrontendIpConfiguration>,
}

/// Load balancer frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendIpConfiguration {
    /// Public IP behind the frontend
    #[serde(default, alias = "publicIPAddress")]
    pub public_ip_address: Option<SubResource>,
}

/// Public IP address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpAddress {
    /// Name
    pub name: String,
    /// Tags
    #[serde(default)]
    pub tags: RawTags,
}

//! Azure resource listers
//!
//! One lister per top-level kind. Virtual networks are listed together with
//! their subnets, and scale sets together with the role assignments granted
//! to their managed identities, since those children can only be found
//! through their parent.
//!
//! Dependency edges (a resource's `blocks`):
//!
//! | Kind                 | Blocks                                                        |
//! |----------------------|---------------------------------------------------------------|
//! | VirtualNetwork       | resource group, NSGs attached to its subnets                  |
//! | Subnet               | its virtual network, resource group                           |
//! | NetworkSecurityGroup | resource group                                                |
//! | RouteTable           | resource group                                                |
//! | VMScaleSet           | resource group, networks/subnets/LBs it uses, VM data disks   |
//! | RoleAssignment       | resource group, the scale set holding the identity            |
//! | Disk, PublicIPAddress| resource group                                                |
//! | LoadBalancer         | resource group, public IPs behind its frontends               |

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use lattice_reclaim::{
    resource_key, ClusterIdentity, Deleter, OperationError, Resource, ResourceLister,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cloud::AzureCloud;
use crate::error::Result;
use crate::ids::{
    parse_load_balancer_id, parse_network_security_group_id, parse_public_ip_address_id,
    parse_subnet_id,
};
use crate::types::{owned_by, RoleAssignment, VmScaleSet, VmScaleSetVm};

/// Kind of resource groups
pub const RESOURCE_GROUP: &str = "ResourceGroup";
/// Kind of virtual networks
pub const VIRTUAL_NETWORK: &str = "VirtualNetwork";
/// Kind of network security groups
pub const NETWORK_SECURITY_GROUP: &str = "NetworkSecurityGroup";
/// Kind of subnets
pub const SUBNET: &str = "Subnet";
/// Kind of route tables
pub const ROUTE_TABLE: &str = "RouteTable";
/// Kind of VM scale sets
pub const VM_SCALE_SET: &str = "VMScaleSet";
/// Kind of managed disks
pub const DISK: &str = "Disk";
/// Kind of role assignments
pub const ROLE_ASSIGNMENT: &str = "RoleAssignment";
/// Kind of load balancers
pub const LOAD_BALANCER: &str = "LoadBalancer";
/// Kind of public IP addresses
pub const PUBLIC_IP_ADDRESS: &str = "PublicIPAddress";

/// Where the cluster lives and which of its resources are shared
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureClusterInfo {
    /// Resource group holding the cluster
    pub resource_group_name: String,
    /// The resource group was not created for this cluster
    pub resource_group_shared: bool,
    /// The virtual network, its subnets and NSGs were not created for this cluster
    pub network_shared: bool,
    /// The route table was not created for this cluster
    pub route_table_shared: bool,
}

impl AzureClusterInfo {
    /// Info for a cluster in `resource_group_name`, nothing shared
    pub fn new(resource_group_name: impl Into<String>) -> Self {
        Self {
            resource_group_name: resource_group_name.into(),
            ..Default::default()
        }
    }

    /// Mark the resource group shared
    pub fn with_resource_group_shared(mut self, shared: bool) -> Self {
        self.resource_group_shared = shared;
        self
    }

    /// Mark the network shared
    pub fn with_network_shared(mut self, shared: bool) -> Self {
        self.network_shared = shared;
        self
    }

    /// Mark the route table shared
    pub fn with_route_table_shared(mut self, shared: bool) -> Self {
        self.route_table_shared = shared;
        self
    }
}

/// Which listing a lister performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AzureKind {
    /// Resource groups
    ResourceGroups,
    /// Virtual networks and their subnets
    VirtualNetworks,
    /// Network security groups
    NetworkSecurityGroups,
    /// Route tables
    RouteTables,
    /// Scale sets and their role assignments
    VmScaleSets,
    /// Managed disks
    Disks,
    /// Load balancers
    LoadBalancers,
    /// Public IP addresses
    PublicIpAddresses,
}

impl AzureKind {
    /// Every listing, in the order they are registered
    pub const ALL: [AzureKind; 8] = [
        Self::ResourceGroups,
        Self::VirtualNetworks,
        Self::NetworkSecurityGroups,
        Self::RouteTables,
        Self::VmScaleSets,
        Self::Disks,
        Self::LoadBalancers,
        Self::PublicIpAddresses,
    ];

    /// Kind name of the primary resource this listing returns
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResourceGroups => RESOURCE_GROUP,
            Self::VirtualNetworks => VIRTUAL_NETWORK,
            Self::NetworkSecurityGroups => NETWORK_SECURITY_GROUP,
            Self::RouteTables => ROUTE_TABLE,
            Self::VmScaleSets => VM_SCALE_SET,
            Self::Disks => DISK,
            Self::LoadBalancers => LOAD_BALANCER,
            Self::PublicIpAddresses => PUBLIC_IP_ADDRESS,
        }
    }
}

/// Build one lister per [`AzureKind`]
pub fn azure_listers(
    cloud: Arc<dyn AzureCloud>,
    info: AzureClusterInfo,
) -> Vec<Arc<dyn ResourceLister>> {
    let info = Arc::new(info);
    AzureKind::ALL
        .iter()
        .map(|kind| {
            Arc::new(AzureLister::new(*kind, cloud.clone(), info.clone()))
                as Arc<dyn ResourceLister>
        })
        .collect()
}

/// Lists one [`AzureKind`] for a cluster
pub struct AzureLister {
    kind: AzureKind,
    cloud: Arc<dyn AzureCloud>,
    info: Arc<AzureClusterInfo>,
}

#[async_trait]
impl ResourceLister for AzureLister {
    fn kind(&self) -> &'static str {
        self.kind.name()
    }

    async fn list(
        &self,
        cluster: &ClusterIdentity,
    ) -> std::result::Result<Vec<Resource>, OperationError> {
        let listed = match self.kind {
            AzureKind::ResourceGroups => self.list_resource_groups(cluster).await,
            AzureKind::VirtualNetworks => self.list_virtual_networks(cluster).await,
            AzureKind::NetworkSecurityGroups => self.list_network_security_groups().await,
            AzureKind::RouteTables => self.list_route_tables(cluster).await,
            AzureKind::VmScaleSets => self.list_vm_scale_sets(cluster).await,
            AzureKind::Disks => self.list_disks(cluster).await,
            AzureKind::LoadBalancers => self.list_load_balancers(cluster).await,
            AzureKind::PublicIpAddresses => self.list_public_ip_addresses(cluster).await,
        };

        let resources = listed?;
        debug!(
            kind = self.kind.name(),
            resource_group = %self.info.resource_group_name,
            count = resources.len(),
            "Listed Azure resources"
        );
        Ok(resources)
    }
}

impl AzureLister {
    /// Create a lister
    pub fn new(kind: AzureKind, cloud: Arc<dyn AzureCloud>, info: Arc<AzureClusterInfo>) -> Self {
        Self { kind, cloud, info }
    }

    fn resource_group(&self) -> &str {
        &self.info.resource_group_name
    }

    fn resource_group_key(&self) -> String {
        resource_key(RESOURCE_GROUP, self.resource_group())
    }

    /// Deleter calling `op(cloud, resource_group, resource)`
    fn deleter<F>(&self, op: F) -> Deleter
    where
        F: for<'a> Fn(&'a dyn AzureCloud, &'a str, &'a Resource) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        let cloud = self.cloud.clone();
        let resource_group = self.info.resource_group_name.clone();
        let op = Arc::new(op);

        Deleter::new(move |resource: Arc<Resource>| {
            let cloud = cloud.clone();
            let resource_group = resource_group.clone();
            let op = op.clone();
            async move {
                op(cloud.as_ref(), resource_group.as_str(), &*resource)
                    .await
                    .map_err(OperationError::from)
            }
        })
    }

    async fn list_resource_groups(&self, cluster: &ClusterIdentity) -> Result<Vec<Resource>> {
        let groups = self.cloud.list_resource_groups().await?;

        Ok(groups
            .into_iter()
            .filter(|g| owned_by(cluster, &g.tags))
            .map(|g| {
                Resource::new(
                    RESOURCE_GROUP,
                    g.name.clone(),
                    self.deleter(|cloud, _, r| cloud.delete_resource_group(&r.name)),
                )
                .with_shared(self.info.resource_group_shared)
                .with_obj(g)
            })
            .collect())
    }

    async fn list_virtual_networks(&self, cluster: &ClusterIdentity) -> Result<Vec<Resource>> {
        let vnets = self.cloud.list_virtual_networks(self.resource_group()).await?;
        let mut resources = Vec::new();

        for vnet in vnets.into_iter().filter(|v| owned_by(cluster, &v.tags)) {
            let mut blocks = BTreeSet::from([self.resource_group_key()]);
            for subnet in &vnet.subnets {
                if let Some(nsg) = &subnet.network_security_group {
                    let name = parse_network_security_group_id(&nsg.id)?;
                    blocks.insert(resource_key(NETWORK_SECURITY_GROUP, &name));
                }
            }

            let subnets = self
                .cloud
                .list_subnets(self.resource_group(), &vnet.name)
                .await?;
            let vnet_name = vnet.name.clone();

            resources.push(
                Resource::new(
                    VIRTUAL_NETWORK,
                    vnet.name.clone(),
                    self.deleter(|cloud, rg, r| cloud.delete_virtual_network(rg, &r.name)),
                )
                .with_blocks(blocks.into_iter().collect())
                .with_shared(self.info.network_shared)
                .with_obj(vnet),
            );

            // Subnets carry no tags of their own; they belong to the cluster with their network
            for subnet in subnets {
                resources.push(
                    Resource::new(SUBNET, subnet.name.clone(), self.subnet_deleter(&vnet_name))
                        .with_blocks(vec![
                            self.resource_group_key(),
                            resource_key(VIRTUAL_NETWORK, &vnet_name),
                        ])
                        .with_shared(self.info.network_shared)
                        .with_obj(subnet),
                );
            }
        }

        Ok(resources)
    }

    fn subnet_deleter(&self, vnet: &str) -> Deleter {
        let cloud = self.cloud.clone();
        let resource_group = self.info.resource_group_name.clone();
        let vnet = vnet.to_string();

        Deleter::new(move |resource: Arc<Resource>| {
            let cloud = cloud.clone();
            let resource_group = resource_group.clone();
            let vnet = vnet.clone();
            async move {
                cloud
                    .delete_subnet(&resource_group, &vnet, &resource.name)
                    .await
                    .map_err(OperationError::from)
            }
        })
    }

    /// Every NSG in the resource group; NSGs are not tagged
    async fn list_network_security_groups(&self) -> Result<Vec<Resource>> {
        let nsgs = self
            .cloud
            .list_network_security_groups(self.resource_group())
            .await?;

        Ok(nsgs
            .into_iter()
            .map(|nsg| {
                Resource::new(
                    NETWORK_SECURITY_GROUP,
                    nsg.name.clone(),
                    self.deleter(|cloud, rg, r| cloud.delete_network_security_group(rg, &r.name)),
                )
                .with_blocks(vec![self.resource_group_key()])
                .with_shared(self.info.network_shared)
                .with_obj(nsg)
            })
            .collect())
    }

    async fn list_route_tables(&self, cluster: &ClusterIdentity) -> Result<Vec<Resource>> {
        let tables = self.cloud.list_route_tables(self.resource_group()).await?;

        Ok(tables
            .into_iter()
            .filter(|t| owned_by(cluster, &t.tags))
            .map(|t| {
                Resource::new(
                    ROUTE_TABLE,
                    t.name.clone(),
                    self.deleter(|cloud, rg, r| cloud.delete_route_table(rg, &r.name)),
                )
                .with_blocks(vec![self.resource_group_key()])
                .with_shared(self.info.route_table_shared)
                .with_obj(t)
            })
            .collect())
    }

    async fn list_vm_scale_sets(&self, cluster: &ClusterIdentity) -> Result<Vec<Resource>> {
        let scale_sets = self.cloud.list_vm_scale_sets(self.resource_group()).await?;
        let mut resources = Vec::new();
        let mut principals: HashMap<String, String> = HashMap::new();

        for vmss in scale_sets.into_iter().filter(|s| owned_by(cluster, &s.tags)) {
            let vms = self
                .cloud
                .list_vm_scale_set_vms(self.resource_group(), &vmss.name)
                .await?;
            let blocks = self.scale_set_blocks(&vmss, &vms)?;

            if let Some(principal) = vmss.principal_id() {
                principals.insert(principal.to_string(), vmss.name.clone());
            }

            resources.push(
                Resource::new(
                    VM_SCALE_SET,
                    vmss.name.clone(),
                    self.deleter(|cloud, rg, r| cloud.delete_vm_scale_set(rg, &r.name)),
                )
                .with_blocks(blocks)
                .with_obj(vmss),
            );
        }

        if principals.is_empty() {
            return Ok(resources);
        }

        let assignments = self
            .cloud
            .list_role_assignments(self.resource_group())
            .await?;
        for ra in assignments {
            let Some(scale_set) = ra.principal_id.as_ref().and_then(|p| principals.get(p)) else {
                continue;
            };
            let blocks = vec![
                self.resource_group_key(),
                resource_key(VM_SCALE_SET, scale_set),
            ];
            resources.push(
                Resource::new(ROLE_ASSIGNMENT, ra.name.clone(), self.role_assignment_deleter())
                    .with_blocks(blocks)
                    .with_obj(ra),
            );
        }

        Ok(resources)
    }

    /// Resource group, networks, subnets and load balancers the scale set's
    /// NICs use, plus every data disk attached to its VMs
    fn scale_set_blocks(&self, vmss: &VmScaleSet, vms: &[VmScaleSetVm]) -> Result<Vec<String>> {
        let mut blocks = BTreeSet::from([self.resource_group_key()]);

        for ip in vmss.ip_configurations() {
            if let Some(subnet) = &ip.subnet {
                let id = parse_subnet_id(&subnet.id)?;
                blocks.insert(resource_key(VIRTUAL_NETWORK, &id.virtual_network_name));
                blocks.insert(resource_key(SUBNET, &id.subnet_name));
            }
            for pool in &ip.load_balancer_backend_address_pools {
                let lb = parse_load_balancer_id(&pool.id)?;
                blocks.insert(resource_key(LOAD_BALANCER, &lb));
            }
        }

        for disk in vms.iter().flat_map(VmScaleSetVm::data_disk_names) {
            blocks.insert(resource_key(DISK, disk));
        }

        Ok(blocks.into_iter().collect())
    }

    /// Role assignments are deleted by scope and name, read from the payload
    fn role_assignment_deleter(&self) -> Deleter {
        let cloud = self.cloud.clone();

        Deleter::new(move |resource: Arc<Resource>| {
            let cloud = cloud.clone();
            async move {
                let ra = resource.obj_as::<RoleAssignment>().ok_or_else(|| {
                    OperationError::fatal(format!(
                        "{} has no role assignment payload",
                        resource.key()
                    ))
                })?;
                cloud
                    .delete_role_assignment(&ra.scope, &ra.name)
                    .await
                    .map_err(OperationError::from)
            }
        })
    }

    async fn list_disks(&self, cluster: &ClusterIdentity) -> Result<Vec<Resource>> {
        let disks = self.cloud.list_disks(self.resource_group()).await?;

        Ok(disks
            .into_iter()
            .filter(|d| owned_by(cluster, &d.tags))
            .map(|d| {
                Resource::new(
                    DISK,
                    d.name.clone(),
                    self.deleter(|cloud, rg, r| cloud.delete_disk(rg, &r.name)),
                )
                .with_blocks(vec![self.resource_group_key()])
                .with_obj(d)
            })
            .collect())
    }

    async fn list_load_balancers(&self, cluster: &ClusterIdentity) -> Result<Vec<Resource>> {
        let lbs = self.cloud.list_load_balancers(self.resource_group()).await?;
        let mut resources = Vec::new();

        for lb in lbs.into_iter().filter(|l| owned_by(cluster, &l.tags)) {
            let mut blocks = BTreeSet::from([self.resource_group_key()]);
            for frontend in &lb.frontend_ip_configurations {
                if let Some(pip) = &frontend.public_ip_address {
                    let name = parse_public_ip_address_id(&pip.id)?;
                    blocks.insert(resource_key(PUBLIC_IP_ADDRESS, &name));
                }
            }

            resources.push(
                Resource::new(
                    LOAD_BALANCER,
                    lb.name.clone(),
                    self.deleter(|cloud, rg, r| cloud.delete_load_balancer(rg, &r.name)),
                )
                .with_blocks(blocks.into_iter().collect())
                .with_obj(lb),
            );
        }

        Ok(resources)
    }

    async fn list_public_ip_addresses(&self, cluster: &ClusterIdentity) -> Result<Vec<Resource>> {
        let pips = self
            .cloud
            .list_public_ip_addresses(self.resource_group())
            .await?;

        Ok(pips
            .into_iter()
            .filter(|p| owned_by(cluster, &p.tags))
            .map(|p| {
                Resource::new(
                    PUBLIC_IP_ADDRESS,
                    p.name.clone(),
                    self.deleter(|cloud, rg, r| cloud.delete_public_ip_address(rg, &r.name)),
                )
                .with_blocks(vec![self.resource_group_key()])
                .with_obj(p)
            })
            .collect())
    }
}

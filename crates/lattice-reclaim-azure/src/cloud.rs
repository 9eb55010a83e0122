//! Azure control-plane seam
//!
//! The listers only talk to Azure through [`AzureCloud`], so they can be
//! exercised against a mock. [`crate::AzCliCloud`] is the real implementation.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::types::{
    Disk, LoadBalancer, NetworkSecurityGroup, PublicIpAddress, ResourceGroup, RoleAssignment,
    RouteTable, Subnet, VirtualNetwork, VmScaleSet, VmScaleSetVm,
};

/// List and delete calls for every kind the listers handle
///
/// Everything except resource groups and role assignment deletion is scoped
/// to a resource group.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AzureCloud: Send + Sync {
    /// List resource groups in the subscription
    async fn list_resource_groups(&self) -> Result<Vec<ResourceGroup>>;
    /// Delete a resource group
    async fn delete_resource_group(&self, name: &str) -> Result<()>;

    /// List virtual networks
    async fn list_virtual_networks(&self, resource_group: &str) -> Result<Vec<VirtualNetwork>>;
    /// Delete a virtual network
    async fn delete_virtual_network(&self, resource_group: &str, name: &str) -> Result<()>;

    /// List subnets of a virtual network
    async fn list_subnets(&self, resource_group: &str, vnet: &str) -> Result<Vec<Subnet>>;
    /// Delete a subnet
    async fn delete_subnet(&self, resource_group: &str, vnet: &str, name: &str) -> Result<()>;

    /// List network security groups
    async fn list_network_security_groups(
        &self,
        resource_group: &str,
    ) -> Result<Vec<NetworkSecurityGroup>>;
    /// Delete a network security group
    async fn delete_network_security_group(&self, resource_group: &str, name: &str)
        -> Result<()>;

    /// List route tables
    async fn list_route_tables(&self, resource_group: &str) -> Result<Vec<RouteTable>>;
    /// Delete a route table
    async fn delete_route_table(&self, resource_group: &str, name: &str) -> Result<()>;

    /// List VM scale sets
    async fn list_vm_scale_sets(&self, resource_group: &str) -> Result<Vec<VmScaleSet>>;
    /// List the instances of a scale set
    async fn list_vm_scale_set_vms(
        &self,
        resource_group: &str,
        scale_set: &str,
    ) -> Result<Vec<VmScaleSetVm>>;
    /// Delete a VM scale set
    async fn delete_vm_scale_set(&self, resource_group: &str, name: &str) -> Result<()>;

    /// List managed disks
    async fn list_disks(&self, resource_group: &str) -> Result<Vec<Disk>>;
    /// Delete a managed disk
    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()>;

    /// List role assignments in a resource group
    async fn list_role_assignments(&self, resource_group: &str) -> Result<Vec<RoleAssignment>>;
    /// Delete a role assignment
    async fn delete_role_assignment(&self, scope: &str, name: &str) -> Result<()>;

    /// List load balancers
    async fn list_load_balancers(&self, resource_group: &str) -> Result<Vec<LoadBalancer>>;
    /// Delete a load balancer
    async fn delete_load_balancer(&self, resource_group: &str, name: &str) -> Result<()>;

    /// List public IP addresses
    async fn list_public_ip_addresses(&self, resource_group: &str)
        -> Result<Vec<PublicIpAddress>>;
    /// Delete a public IP address
    async fn delete_public_ip_address(&self, resource_group: &str, name: &str) -> Result<()>;
}

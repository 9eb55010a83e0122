//! [`AzureCloud`] backed by the `az` command line
//!
//! Every call runs `az <args> -o json` and parses stdout. Authentication is
//! whatever `az` is already logged in with.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::debug;

use crate::cloud::AzureCloud;
use crate::error::{AzureError, Result};
use crate::types::{
    Disk, LoadBalancer, NetworkSecurityGroup, PublicIpAddress, ResourceGroup, RoleAssignment,
    RouteTable, Subnet, VirtualNetwork, VmScaleSet, VmScaleSetVm,
};

/// Default `az` binary
pub const DEFAULT_AZ_BINARY: &str = "az";

/// Runs `az` as a subprocess
#[derive(Debug, Clone)]
pub struct AzCliCloud {
    binary: String,
    subscription: Option<String>,
}

impl Default for AzCliCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl AzCliCloud {
    /// Use `az` from `PATH` with the default subscription
    pub fn new() -> Self {
        Self {
            binary: DEFAULT_AZ_BINARY.to_string(),
            subscription: None,
        }
    }

    /// Use a different `az` binary
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Target a specific subscription
    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    /// Full argument list for a subcommand
    pub fn command_args(&self, args: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        if let Some(subscription) = &self.subscription {
            full.push("--subscription".to_string());
            full.push(subscription.clone());
        }
        full.push("-o".to_string());
        full.push("json".to_string());
        full
    }

    /// Run a subcommand and return stdout
    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let command = describe(args);
        debug!(command = %command, "Running az");

        let output = Command::new(&self.binary)
            .args(self.command_args(args))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AzureError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(AzureError::command_failed(
                command,
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        Ok(output.stdout)
    }

    /// Run a list subcommand and parse its JSON array
    async fn list<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        let stdout = self.run(args).await?;
        parse_list(&describe(args), &stdout)
    }

    /// Run a delete subcommand, ignoring its output
    async fn delete(&self, args: &[&str]) -> Result<()> {
        self.run(args).await.map(|_| ())
    }
}

/// Subcommand words, without flags, for messages
fn describe(args: &[&str]) -> String {
    args.iter()
        .take_while(|a| !a.starts_with('-'))
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a JSON array; empty output means an empty list
pub(crate) fn parse_list<T: DeserializeOwned>(command: &str, stdout: &[u8]) -> Result<Vec<T>> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(stdout).map_err(|e| AzureError::Parse {
        command: command.to_string(),
        message: e.to_string(),
    })
}

/// ARM ID of a role assignment
fn role_assignment_id(scope: &str, name: &str) -> String {
    format!(
        "{}/providers/Microsoft.Authorization/roleAssignments/{}",
        scope.trim_end_matches('/'),
        name
    )
}

#[async_trait]
impl AzureCloud for AzCliCloud {
    async fn list_resource_groups(&self) -> Result<Vec<ResourceGroup>> {
        self.list(&["group", "list"]).await
    }

    async fn delete_resource_group(&self, name: &str) -> Result<()> {
        self.delete(&["group", "delete", "--name", name, "--yes"])
            .await
    }

    async fn list_virtual_networks(&self, resource_group: &str) -> Result<Vec<VirtualNetwork>> {
        self.list(&["network", "vnet", "list", "-g", resource_group])
            .await
    }

    async fn delete_virtual_network(&self, resource_group: &str, name: &str) -> Result<()> {
        self.delete(&["network", "vnet", "delete", "-g", resource_group, "-n", name])
            .await
    }

    async fn list_subnets(&self, resource_group: &str, vnet: &str) -> Result<Vec<Subnet>> {
        self.list(&[
            "network",
            "vnet",
            "subnet",
            "list",
            "-g",
            resource_group,
            "--vnet-name",
            vnet,
        ])
        .await
    }

    async fn delete_subnet(&self, resource_group: &str, vnet: &str, name: &str) -> Result<()> {
        self.delete(&[
            "network",
            "vnet",
            "subnet",
            "delete",
            "-g",
            resource_group,
            "--vnet-name",
            vnet,
            "-n",
            name,
        ])
        .await
    }

    async fn list_network_security_groups(
        &self,
        resource_group: &str,
    ) -> Result<Vec<NetworkSecurityGroup>> {
        self.list(&["network", "nsg", "list", "-g", resource_group])
            .await
    }

    async fn delete_network_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<()> {
        self.delete(&["network", "nsg", "delete", "-g", resource_group, "-n", name])
            .await
    }

    async fn list_route_tables(&self, resource_group: &str) -> Result<Vec<RouteTable>> {
        self.list(&["network", "route-table", "list", "-g", resource_group])
            .await
    }

    async fn delete_route_table(&self, resource_group: &str, name: &str) -> Result<()> {
        self.delete(&[
            "network",
            "route-table",
            "delete",
            "-g",
            resource_group,
            "-n",
            name,
        ])
        .await
    }

    async fn list_vm_scale_sets(&self, resource_group: &str) -> Result<Vec<VmScaleSet>> {
        self.list(&["vmss", "list", "-g", resource_group]).await
    }

    async fn list_vm_scale_set_vms(
        &self,
        resource_group: &str,
        scale_set: &str,
    ) -> Result<Vec<VmScaleSetVm>> {
        self.list(&["vmss", "list-instances", "-g", resource_group, "-n", scale_set])
            .await
    }

    async fn delete_vm_scale_set(&self, resource_group: &str, name: &str) -> Result<()> {
        self.delete(&["vmss", "delete", "-g", resource_group, "-n", name])
            .await
    }

    async fn list_disks(&self, resource_group: &str) -> Result<Vec<Disk>> {
        self.list(&["disk", "list", "-g", resource_group]).await
    }

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()> {
        self.delete(&["disk", "delete", "-g", resource_group, "-n", name, "--yes"])
            .await
    }

    async fn list_role_assignments(&self, resource_group: &str) -> Result<Vec<RoleAssignment>> {
        self.list(&["role", "assignment", "list", "-g", resource_group])
            .await
    }

    async fn delete_role_assignment(&self, scope: &str, name: &str) -> Result<()> {
        let id = role_assignment_id(scope, name);
        self.delete(&["role", "assignment", "delete", "--ids", &id])
            .await
    }

    async fn list_load_balancers(&self, resource_group: &str) -> Result<Vec<LoadBalancer>> {
        self.list(&["network", "lb", "list", "-g", resource_group])
            .await
    }

    async fn delete_load_balancer(&self, resource_group: &str, name: &str) -> Result<()> {
        self.delete(&["network", "lb", "delete", "-g", resource_group, "-n", name])
            .await
    }

    async fn list_public_ip_addresses(
        &self,
        resource_group: &str,
    ) -> Result<Vec<PublicIpAddress>> {
        self.list(&["network", "public-ip", "list", "-g", resource_group])
            .await
    }

    async fn delete_public_ip_address(&self, resource_group: &str, name: &str) -> Result<()> {
        self.delete(&[
            "network",
            "public-ip",
            "delete",
            "-g",
            resource_group,
            "-n",
            name,
        ])
        .await
    }
}

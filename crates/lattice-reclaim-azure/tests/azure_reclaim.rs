//! Reclaiming a whole Azure cluster through an in-memory cloud

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lattice_reclaim::{
    BackoffConfig, ClusterIdentity, PendingReason, ReclaimOptions, ReclaimStatus, Reclaimer,
};
use lattice_reclaim_azure::types::{
    DataDisk, Disk, FrontendIpConfiguration, IpConfiguration, LoadBalancer, ManagedIdentity,
    NetworkProfile, NetworkSecurityGroup, NicConfiguration, PublicIpAddress, RawTags,
    ResourceGroup, RoleAssignment, RouteTable, StorageProfile, SubResource, Subnet,
    VirtualNetwork, VmProfile, VmScaleSet, VmScaleSetVm,
};
use lattice_reclaim_azure::{azure_listers, AzureClusterInfo, AzureCloud, AzureError, Result};
use tokio_util::sync::CancellationToken;

const NET: &str = "/subscriptions/s/resourceGroups/rg1/providers/Microsoft.Network";

fn tags() -> RawTags {
    Some(BTreeMap::from([(
        "KubernetesCluster".to_string(),
        Some("prod".to_string()),
    )]))
}

/// A single-cluster resource group; deletions are recorded and remove the object
#[derive(Default)]
struct FakeAzure {
    deleted: Mutex<Vec<String>>,
}

impl FakeAzure {
    fn record(&self, key: String) -> Result<()> {
        let mut deleted = self.deleted.lock().unwrap();
        if deleted.contains(&key) {
            return Err(AzureError::command_failed("delete", "(ResourceNotFound) gone"));
        }
        deleted.push(key);
        Ok(())
    }

    fn gone(&self, key: &str) -> bool {
        self.deleted.lock().unwrap().iter().any(|k| k == key)
    }

    fn position(&self, key: &str) -> usize {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .position(|k| k == key)
            .unwrap_or_else(|| panic!("{} was not deleted", key))
    }

    /// Resource-group-scoped listings fail once the group is deleted, as `az` does
    fn scope(&self) -> Result<()> {
        if self.gone("ResourceGroup:rg1") {
            return Err(AzureError::command_failed(
                "list",
                "ERROR: (ResourceGroupNotFound) Resource group 'rg1' could not be found.",
            ));
        }
        Ok(())
    }

    fn keep<T>(&self, key: &str, item: T) -> Option<T> {
        (!self.gone(key)).then_some(item)
    }
}

#[async_trait]
impl AzureCloud for FakeAzure {
    async fn list_resource_groups(&self) -> Result<Vec<ResourceGroup>> {
        Ok(self
            .keep("ResourceGroup:rg1", ResourceGroup { name: "rg1".to_string(), tags: tags() })
            .into_iter()
            .collect())
    }

    async fn delete_resource_group(&self, name: &str) -> Result<()> {
        self.record(format!("ResourceGroup:{}", name))
    }

    async fn list_virtual_networks(&self, _: &str) -> Result<Vec<VirtualNetwork>> {
        self.scope()?;
        let vnet = VirtualNetwork {
            name: "net1".to_string(),
            tags: tags(),
            subnets: vec![Subnet {
                name: "sn1".to_string(),
                network_security_group: Some(SubResource {
                    id: format!("{}/networkSecurityGroups/nsg1", NET),
                }),
            }],
        };
        Ok(self.keep("VirtualNetwork:net1", vnet).into_iter().collect())
    }

    async fn delete_virtual_network(&self, _: &str, name: &str) -> Result<()> {
        self.record(format!("VirtualNetwork:{}", name))
    }

    async fn list_subnets(&self, _: &str, _: &str) -> Result<Vec<Subnet>> {
        self.scope()?;
        let subnet = Subnet {
            name: "sn1".to_string(),
            network_security_group: None,
        };
        Ok(self.keep("Subnet:sn1", subnet).into_iter().collect())
    }

    async fn delete_subnet(&self, _: &str, _: &str, name: &str) -> Result<()> {
        self.record(format!("Subnet:{}", name))
    }

    async fn list_network_security_groups(&self, _: &str) -> Result<Vec<NetworkSecurityGroup>> {
        self.scope()?;
        let nsg = NetworkSecurityGroup { name: "nsg1".to_string(), tags: None };
        Ok(self.keep("NetworkSecurityGroup:nsg1", nsg).into_iter().collect())
    }

    async fn delete_network_security_group(&self, _: &str, name: &str) -> Result<()> {
        self.record(format!("NetworkSecurityGroup:{}", name))
    }

    async fn list_route_tables(&self, _: &str) -> Result<Vec<RouteTable>> {
        self.scope()?;
        let rt = RouteTable { name: "rt1".to_string(), tags: tags() };
        Ok(self.keep("RouteTable:rt1", rt).into_iter().collect())
    }

    async fn delete_route_table(&self, _: &str, name: &str) -> Result<()> {
        self.record(format!("RouteTable:{}", name))
    }

    async fn list_vm_scale_sets(&self, _: &str) -> Result<Vec<VmScaleSet>> {
        self.scope()?;
        let vmss = VmScaleSet {
            name: "nodes".to_string(),
            tags: tags(),
            identity: Some(ManagedIdentity {
                principal_id: Some("p-1".to_string()),
            }),
            virtual_machine_profile: Some(VmProfile {
                network_profile: Some(NetworkProfile {
                    network_interface_configurations: vec![NicConfiguration {
                        ip_configurations: vec![IpConfiguration {
                            subnet: Some(SubResource {
                                id: format!("{}/virtualNetworks/net1/subnets/sn1", NET),
                            }),
                            load_balancer_backend_address_pools: vec![SubResource {
                                id: format!("{}/loadBalancers/api/backendAddressPools/pool", NET),
                            }],
                        }],
                    }],
                }),
            }),
        };
        Ok(self.keep("VMScaleSet:nodes", vmss).into_iter().collect())
    }

    async fn list_vm_scale_set_vms(&self, _: &str, _: &str) -> Result<Vec<VmScaleSetVm>> {
        self.scope()?;
        Ok(vec![VmScaleSetVm {
            name: "nodes_0".to_string(),
            storage_profile: Some(StorageProfile {
                data_disks: vec![DataDisk { name: "etcd-0".to_string() }],
            }),
        }])
    }

    async fn delete_vm_scale_set(&self, _: &str, name: &str) -> Result<()> {
        self.record(format!("VMScaleSet:{}", name))
    }

    async fn list_disks(&self, _: &str) -> Result<Vec<Disk>> {
        self.scope()?;
        let disk = Disk { name: "etcd-0".to_string(), tags: tags() };
        Ok(self.keep("Disk:etcd-0", disk).into_iter().collect())
    }

    async fn delete_disk(&self, _: &str, name: &str) -> Result<()> {
        self.record(format!("Disk:{}", name))
    }

    async fn list_role_assignments(&self, _: &str) -> Result<Vec<RoleAssignment>> {
        self.scope()?;
        let ra = RoleAssignment {
            name: "ra1".to_string(),
            scope: "/subscriptions/s/resourceGroups/rg1".to_string(),
            principal_id: Some("p-1".to_string()),
        };
        Ok(self.keep("RoleAssignment:ra1", ra).into_iter().collect())
    }

    async fn delete_role_assignment(&self, _: &str, name: &str) -> Result<()> {
        self.record(format!("RoleAssignment:{}", name))
    }

    async fn list_load_balancers(&self, _: &str) -> Result<Vec<LoadBalancer>> {
        self.scope()?;
        let lb = LoadBalancer {
            name: "api".to_string(),
            tags: tags(),
            frontend_ip_configurations: vec![FrontendIpConfiguration {
                public_ip_address: Some(SubResource {
                    id: format!("{}/publicIPAddresses/api-ip", NET),
                }),
            }],
        };
        Ok(self.keep("LoadBalancer:api", lb).into_iter().collect())
    }

    async fn delete_load_balancer(&self, _: &str, name: &str) -> Result<()> {
        self.record(format!("LoadBalancer:{}", name))
    }

    async fn list_public_ip_addresses(&self, _: &str) -> Result<Vec<PublicIpAddress>> {
        self.scope()?;
        let pip = PublicIpAddress { name: "api-ip".to_string(), tags: tags() };
        Ok(self.keep("PublicIPAddress:api-ip", pip).into_iter().collect())
    }

    async fn delete_public_ip_address(&self, _: &str, name: &str) -> Result<()> {
        self.record(format!("PublicIPAddress:{}", name))
    }
}

fn options() -> ReclaimOptions {
    ReclaimOptions::default().with_backoff(BackoffConfig::none())
}

async fn reclaim(cloud: Arc<FakeAzure>, info: AzureClusterInfo) -> lattice_reclaim::ReclaimReport {
    Reclaimer::new(azure_listers(cloud, info))
        .reclaim(&ClusterIdentity::new("prod"), &options(), &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn whole_cluster_is_deleted_in_dependency_order() {
    let cloud = Arc::new(FakeAzure::default());

    let report = reclaim(cloud.clone(), AzureClusterInfo::new("rg1")).await;

    assert_eq!(report.status(), ReclaimStatus::Reclaimed);
    assert_eq!(report.resources.len(), 10);

    let before = |a: &str, b: &str| {
        assert!(
            cloud.position(a) < cloud.position(b),
            "{} should be deleted before {}",
            a,
            b
        )
    };
    before("RoleAssignment:ra1", "VMScaleSet:nodes");
    before("VMScaleSet:nodes", "Disk:etcd-0");
    before("VMScaleSet:nodes", "LoadBalancer:api");
    before("VMScaleSet:nodes", "Subnet:sn1");
    before("Subnet:sn1", "VirtualNetwork:net1");
    before("VirtualNetwork:net1", "NetworkSecurityGroup:nsg1");
    before("LoadBalancer:api", "PublicIPAddress:api-ip");
    assert_eq!(
        cloud.deleted.lock().unwrap().last().map(String::as_str),
        Some("ResourceGroup:rg1")
    );
}

#[tokio::test]
async fn shared_network_and_group_are_left_alone() {
    let cloud = Arc::new(FakeAzure::default());
    let info = AzureClusterInfo::new("rg1")
        .with_resource_group_shared(true)
        .with_network_shared(true);

    let report = reclaim(cloud.clone(), info).await;

    assert_eq!(report.status(), ReclaimStatus::ReclaimedExceptShared);
    for key in [
        "ResourceGroup:rg1",
        "VirtualNetwork:net1",
        "Subnet:sn1",
        "NetworkSecurityGroup:nsg1",
    ] {
        assert!(!cloud.gone(key), "{} must not be deleted", key);
        assert_eq!(
            report.resource(key).unwrap().pending_reason,
            Some(PendingReason::Shared)
        );
    }
    assert!(cloud.gone("VMScaleSet:nodes"));
    assert!(cloud.gone("PublicIPAddress:api-ip"));
}

#[tokio::test]
async fn second_run_finds_nothing_left() {
    let cloud = Arc::new(FakeAzure::default());
    let first = reclaim(cloud.clone(), AzureClusterInfo::new("rg1")).await;
    assert_eq!(first.status(), ReclaimStatus::Reclaimed);
    let deleted = cloud.deleted.lock().unwrap().len();

    let report = reclaim(cloud.clone(), AzureClusterInfo::new("rg1")).await;

    assert!(report.resources.is_empty());
    assert!(report.listing_failures.is_empty());
    assert_eq!(report.status(), ReclaimStatus::Reclaimed);
    assert!(report.clone().into_result().is_ok());
    assert_eq!(cloud.deleted.lock().unwrap().len(), deleted);
}

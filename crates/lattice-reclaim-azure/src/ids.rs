//! ARM resource ID parsing
//!
//! IDs look like
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{child-type}/{child-name}...]`.
//! Segment names are matched case-insensitively, as ARM does.

use crate::error::{AzureError, Result};

/// A parsed ARM resource ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    /// Subscription ID
    pub subscription_id: String,
    /// Resource group name
    pub resource_group: String,
    /// Provider namespace, e.g. `Microsoft.Network`
    pub provider: String,
    /// `(type, name)` pairs from the top-level resource down
    pub path: Vec<(String, String)>,
}

impl ResourceId {
    /// Parse an ID, reporting failures against `kind`
    pub fn parse(kind: &'static str, id: &str) -> Result<Self> {
        let segments: Vec<&str> = id.trim_start_matches('/').split('/').collect();

        if segments.len() < 8 || segments.len() % 2 != 0 {
            return Err(AzureError::invalid_id(
                kind,
                id,
                format!("unexpected number of segments ({})", segments.len()),
            ));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(AzureError::invalid_id(kind, id, "empty segment"));
        }

        expect_segment(kind, id, segments[0], "subscriptions")?;
        expect_segment(kind, id, segments[2], "resourceGroups")?;
        expect_segment(kind, id, segments[4], "providers")?;

        let path = segments[6..]
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();

        Ok(Self {
            subscription_id: segments[1].to_string(),
            resource_group: segments[3].to_string(),
            provider: segments[5].to_string(),
            path,
        })
    }

    /// Name of the path element with the given type
    pub fn name_of(&self, resource_type: &str) -> Option<&str> {
        self.path
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(resource_type))
            .map(|(_, name)| name.as_str())
    }

    /// Name of the top-level resource, requiring its type
    fn top_level(&self, kind: &'static str, id: &str, resource_type: &str) -> Result<String> {
        match self.path.first() {
            Some((t, name)) if t.eq_ignore_ascii_case(resource_type) => Ok(name.clone()),
            Some((t, _)) => Err(AzureError::invalid_id(
                kind,
                id,
                format!("expected {} but found {}", resource_type, t),
            )),
            None => Err(AzureError::invalid_id(kind, id, "missing resource type")),
        }
    }
}

fn expect_segment(kind: &'static str, id: &str, actual: &str, expected: &str) -> Result<()> {
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(AzureError::invalid_id(
            kind,
            id,
            format!("expected segment {:?} but found {:?}", expected, actual),
        ))
    }
}

/// A subnet of a virtual network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetId {
    /// Resource group holding the virtual network
    pub resource_group: String,
    /// Virtual network name
    pub virtual_network_name: String,
    /// Subnet name
    pub subnet_name: String,
}

/// Parse a subnet ID
pub fn parse_subnet_id(id: &str) -> Result<SubnetId> {
    let parsed = ResourceId::parse("subnet", id)?;
    let virtual_network_name = parsed.top_level("subnet", id, "virtualNetworks")?;
    let subnet_name = parsed
        .name_of("subnets")
        .ok_or_else(|| AzureError::invalid_id("subnet", id, "missing subnets segment"))?
        .to_string();

    Ok(SubnetId {
        resource_group: parsed.resource_group,
        virtual_network_name,
        subnet_name,
    })
}

/// Parse a network security group ID, returning its name
pub fn parse_network_security_group_id(id: &str) -> Result<String> {
    ResourceId::parse("network security group", id)?.top_level(
        "network security group",
        id,
        "networkSecurityGroups",
    )
}

/// Parse a load balancer ID or the ID of one of its sub-resources
/// (backend pools, frontend configurations), returning the load balancer name
pub fn parse_load_balancer_id(id: &str) -> Result<String> {
    ResourceId::parse("load balancer", id)?.top_level("load balancer", id, "loadBalancers")
}

/// Parse a public IP address ID, returning its name
pub fn parse_public_ip_address_id(id: &str) -> Result<String> {
    ResourceId::parse("public IP address", id)?.top_level(
        "public IP address",
        id,
        "publicIPAddresses",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PREFIX: &str = "/subscriptions/sub-1/resourceGroups/rg1/providers/Microsoft.Network";

    #[test]
    fn parses_subnet_id() {
        let id = parse_subnet_id(&format!("{}/virtualNetworks/net1/subnets/sn1", PREFIX)).unwrap();
        assert_eq!(
            id,
            SubnetId {
                resource_group: "rg1".to_string(),
                virtual_network_name: "net1".to_string(),
                subnet_name: "sn1".to_string(),
            }
        );
    }

    #[test]
    fn segment_types_are_case_insensitive() {
        let id = "/SUBSCRIPTIONS/sub-1/resourcegroups/rg1/providers/Microsoft.Network/virtualnetworks/net1/SUBNETS/sn1";
        assert_eq!(parse_subnet_id(id).unwrap().subnet_name, "sn1");
    }

    #[test]
    fn load_balancer_name_from_backend_pool() {
        let id = format!("{}/loadBalancers/api-lb/backendAddressPools/masters", PREFIX);
        assert_eq!(parse_load_balancer_id(&id).unwrap(), "api-lb");
    }

    #[test]
    fn parses_nsg_and_public_ip() {
        assert_eq!(
            parse_network_security_group_id(&format!("{}/networkSecurityGroups/nsg1", PREFIX))
                .unwrap(),
            "nsg1"
        );
        assert_eq!(
            parse_public_ip_address_id(&format!("{}/publicIPAddresses/pip1", PREFIX)).unwrap(),
            "pip1"
        );
    }

    #[rstest]
    #[case::too_short("/subscriptions/sub-1/resourceGroups/rg1")]
    #[case::odd_segments("/subscriptions/sub-1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks")]
    #[case::wrong_prefix("/tenants/t/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/net1/subnets/sn1")]
    #[case::wrong_type("/subscriptions/s/resourceGroups/rg1/providers/Microsoft.Network/loadBalancers/lb/subnets/sn1")]
    #[case::no_subnet("/subscriptions/s/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/net1")]
    #[case::empty_segment("/subscriptions//resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/net1/subnets/sn1")]
    fn rejects_malformed_subnet_ids(#[case] id: &str) {
        assert!(matches!(
            parse_subnet_id(id),
            Err(AzureError::InvalidResourceId { kind: "subnet", .. })
        ));
    }
}

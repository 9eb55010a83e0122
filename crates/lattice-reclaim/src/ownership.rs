//! Cluster ownership filter
//!
//! Adapters convert their provider's tag representation into a plain
//! key/value map and ask the [`ClusterIdentity`] whether it owns the object.
//! Matching is exact: the designated tag key must map to the cluster name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tag key carrying the owning cluster's name
pub const CLUSTER_NAME_TAG: &str = "KubernetesCluster";

/// Identity of the cluster being reclaimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    /// Cluster name
    pub name: String,
    /// Tag key whose value must equal the cluster name
    pub tag_key: String,
}

impl ClusterIdentity {
    /// Identity using the default [`CLUSTER_NAME_TAG`]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag_key: CLUSTER_NAME_TAG.to_string(),
        }
    }

    /// Override the ownership tag key
    pub fn with_tag_key(mut self, tag_key: impl Into<String>) -> Self {
        self.tag_key = tag_key.into();
        self
    }

    /// Whether an object with these tags belongs to this cluster
    pub fn owns(&self, tags: &BTreeMap<String, String>) -> bool {
        is_owned_by_cluster(tags, self)
    }
}

/// True iff `tags[cluster.tag_key] == cluster.name`
pub fn is_owned_by_cluster(tags: &BTreeMap<String, String>, cluster: &ClusterIdentity) -> bool {
    tags.get(&cluster.tag_key)
        .is_some_and(|value| value == &cluster.name)
}

/// Normalize provider tags where values may be null
///
/// Null values are dropped, so they never match a cluster name.
pub fn normalize_tags<I, K, V>(tags: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: Into<String>,
    V: Into<String>,
{
    tags.into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.into(), v.into())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn owned_when_tag_matches_exactly() {
        let cluster = ClusterIdentity::new("prod");
        assert!(cluster.owns(&tags(&[(CLUSTER_NAME_TAG, "prod")])));
    }

    #[test]
    fn not_owned_on_partial_or_case_mismatch() {
        let cluster = ClusterIdentity::new("prod");
        assert!(!cluster.owns(&tags(&[(CLUSTER_NAME_TAG, "prod-2")])));
        assert!(!cluster.owns(&tags(&[(CLUSTER_NAME_TAG, "Prod")])));
        assert!(!cluster.owns(&tags(&[(CLUSTER_NAME_TAG, "pro")])));
    }

    #[test]
    fn not_owned_when_value_sits_under_another_key() {
        let cluster = ClusterIdentity::new("prod");
        assert!(!cluster.owns(&tags(&[("Name", "prod")])));
        assert!(!cluster.owns(&BTreeMap::new()));
    }

    #[test]
    fn custom_tag_key() {
        let cluster = ClusterIdentity::new("prod").with_tag_key("lattice.dev/cluster");
        assert!(cluster.owns(&tags(&[("lattice.dev/cluster", "prod")])));
        assert!(!cluster.owns(&tags(&[(CLUSTER_NAME_TAG, "prod")])));
    }

    #[test]
    fn normalize_drops_null_values() {
        let normalized = normalize_tags(vec![
            (CLUSTER_NAME_TAG, None::<&str>),
            ("env", Some("dev")),
        ]);
        assert_eq!(normalized, tags(&[("env", "dev")]));

        let cluster = ClusterIdentity::new("");
        assert!(!cluster.owns(&normalized));
    }
}

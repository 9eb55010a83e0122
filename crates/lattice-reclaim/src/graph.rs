//! Dependency graph building
//!
//! Aggregates the descriptors from every adapter into one map keyed by
//! resource key, and inverts the declared `blocks` edges into a
//! `blocked_by` index: for each resource X, the present resources that must
//! be deleted before X.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ReclaimError;
use crate::plan::DeletionPlan;
use crate::resource::Resource;

/// How the builder treats duplicate keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildMode {
    /// Last writer wins; duplicates are logged and recorded
    #[default]
    Tolerant,
    /// The first duplicate fails the build
    Strict,
}

/// A `blocks` entry naming a resource that is not in the graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DanglingBlock {
    /// Key of the resource declaring the edge
    pub from: String,
    /// Key that is not present
    pub to: String,
}

/// The keyed resource map plus its reverse dependency index
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Resources by key
    resources: HashMap<String, Arc<Resource>>,
    /// For each key, the present resources that must be deleted first
    blocked_by: HashMap<String, BTreeSet<String>>,
    /// Keys reported more than once
    duplicates: Vec<String>,
    /// Edges pointing outside the graph
    dangling: Vec<DanglingBlock>,
}

impl DependencyGraph {
    /// Build the graph from the concatenated output of all adapters
    ///
    /// Resources already marked `done` are dropped and never act as blockers.
    pub fn build(resources: Vec<Resource>, mode: BuildMode) -> Result<Self, ReclaimError> {
        let mut graph = Self::default();
        let mut skipped_done = 0usize;

        for resource in resources {
            if resource.done {
                skipped_done += 1;
                continue;
            }

            let key = resource.key();
            if graph.resources.contains_key(&key) {
                if mode == BuildMode::Strict {
                    return Err(ReclaimError::DuplicateKey { key });
                }
                warn!(key = %key, "Duplicate resource key, keeping the last one listed");
                graph.duplicates.push(key.clone());
            }
            graph.resources.insert(key, Arc::new(resource));
        }

        graph.index_blockers();

        info!(
            resources = graph.resources.len(),
            skipped_done = skipped_done,
            duplicates = graph.duplicates.len(),
            dangling_blocks = graph.dangling.len(),
            "Built dependency graph"
        );

        Ok(graph)
    }

    /// Invert `blocks` into `blocked_by`, keeping only edges between present resources
    fn index_blockers(&mut self) {
        let mut blocked_by: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut dangling = BTreeSet::new();

        for (key, resource) in &self.resources {
            for blocked in &resource.blocks {
                if self.resources.contains_key(blocked) {
                    blocked_by
                        .entry(blocked.clone())
                        .or_default()
                        .insert(key.clone());
                } else {
                    debug!(from = %key, to = %blocked, "Blocked resource not in graph, treating edge as satisfied");
                    dangling.insert(DanglingBlock {
                        from: key.clone(),
                        to: blocked.clone(),
                    });
                }
            }
        }

        self.blocked_by = blocked_by;
        self.dangling = dangling.into_iter().collect();
    }

    /// Get a resource by key
    pub fn get(&self, key: &str) -> Option<&Arc<Resource>> {
        self.resources.get(key)
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.resources.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All resources, sorted by key
    pub fn resources(&self) -> BTreeMap<&str, &Arc<Resource>> {
        self.resources
            .iter()
            .map(|(k, r)| (k.as_str(), r))
            .collect()
    }

    /// Keys of the present resources that must be deleted before `key`
    pub fn blocked_by(&self, key: &str) -> impl Iterator<Item = &str> {
        self.blocked_by
            .get(key)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the graph is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Keys listed by more than one descriptor (tolerant mode)
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// `blocks` entries that reference absent resources
    pub fn dangling_blocks(&self) -> &[DanglingBlock] {
        &self.dangling
    }

    /// Compute the static deletion rounds for a dry run
    pub fn plan(&self) -> DeletionPlan {
        DeletionPlan::from_graph(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Deleter;

    fn make_resource(kind: &str, id: &str, blocks: &[&str]) -> Resource {
        Resource::new(kind, id, Deleter::new(|_| async { Ok(()) }))
            .with_blocks(blocks.iter().map(|b| b.to_string()).collect())
    }

    fn blockers(graph: &DependencyGraph, key: &str) -> Vec<String> {
        graph.blocked_by(key).map(String::from).collect()
    }

    #[test]
    fn inverts_blocks_into_blocked_by() {
        let graph = DependencyGraph::build(
            vec![
                make_resource("resource-group", "rg1", &[]),
                make_resource("network", "net1", &["resource-group:rg1"]),
                make_resource("subnet", "sn1", &["network:net1", "resource-group:rg1"]),
            ],
            BuildMode::Tolerant,
        )
        .unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(
            blockers(&graph, "resource-group:rg1"),
            vec!["network:net1", "subnet:sn1"]
        );
        assert_eq!(blockers(&graph, "network:net1"), vec!["subnet:sn1"]);
        assert!(blockers(&graph, "subnet:sn1").is_empty());
    }

    #[test]
    fn done_resources_are_dropped_and_never_block() {
        let graph = DependencyGraph::build(
            vec![
                make_resource("resource-group", "rg1", &[]),
                make_resource("disk", "d1", &["resource-group:rg1"]).with_done(true),
            ],
            BuildMode::Tolerant,
        )
        .unwrap();

        assert_eq!(graph.len(), 1);
        assert!(!graph.contains("disk:d1"));
        assert!(blockers(&graph, "resource-group:rg1").is_empty());
    }

    #[test]
    fn absent_blocked_keys_are_recorded_as_dangling() {
        let graph = DependencyGraph::build(
            vec![make_resource("network", "net1", &["resource-group:gone"])],
            BuildMode::Tolerant,
        )
        .unwrap();

        assert_eq!(
            graph.dangling_blocks(),
            &[DanglingBlock {
                from: "network:net1".to_string(),
                to: "resource-group:gone".to_string(),
            }]
        );
        assert!(blockers(&graph, "resource-group:gone").is_empty());
    }

    #[test]
    fn tolerant_mode_keeps_last_duplicate() {
        let graph = DependencyGraph::build(
            vec![
                make_resource("disk", "d1", &[]),
                make_resource("disk", "d1", &[]).with_name("second"),
            ],
            BuildMode::Tolerant,
        )
        .unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get("disk:d1").unwrap().name, "second");
        assert_eq!(graph.duplicates(), &["disk:d1".to_string()]);
    }

    #[test]
    fn strict_mode_rejects_duplicates() {
        let result = DependencyGraph::build(
            vec![make_resource("disk", "d1", &[]), make_resource("disk", "d1", &[])],
            BuildMode::Strict,
        );

        match result {
            Err(ReclaimError::DuplicateKey { key }) => assert_eq!(key, "disk:d1"),
            other => panic!("expected duplicate key error, got {:?}", other),
        }
    }

    #[test]
    fn keys_are_sorted() {
        let graph = DependencyGraph::build(
            vec![
                make_resource("subnet", "b", &[]),
                make_resource("disk", "z", &[]),
                make_resource("network", "a", &[]),
            ],
            BuildMode::Tolerant,
        )
        .unwrap();

        assert_eq!(graph.keys(), vec!["disk:z", "network:a", "subnet:b"]);
        assert_eq!(
            graph.resources().keys().copied().collect::<Vec<_>>(),
            vec!["disk:z", "network:a", "subnet:b"]
        );
    }

    #[test]
    fn empty_input_builds_empty_graph() {
        let graph = DependencyGraph::build(Vec::new(), BuildMode::Strict).unwrap();
        assert!(graph.is_empty());
        assert!(graph.duplicates().is_empty());
    }
}

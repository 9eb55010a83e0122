//! Static deletion plan for dry runs
//!
//! Layers the graph into rounds the way the orchestrator would walk it if
//! every deleter succeeded on its first attempt. A resource lands in round N
//! when every present resource that blocks it lands in a round before N.
//! Shared resources are never scheduled, so anything they block (directly
//! or transitively) ends up unschedulable alongside cycle members.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::graph::DependencyGraph;

/// Ordered deletion rounds computed without touching the provider
#[derive(Debug, Clone, Default)]
pub struct DeletionPlan {
    /// Keys per round, each round sorted
    rounds: Vec<Vec<String>>,
    /// Round number (1-based) by key
    round_of: HashMap<String, u32>,
    /// Keys that can never be scheduled, sorted
    unschedulable: Vec<String>,
}

impl DeletionPlan {
    /// Compute the plan from a graph
    ///
    /// Uses Kahn's algorithm:
    /// 1. Find all unscheduled, non-shared resources whose blockers are scheduled
    /// 2. Put them in the current round
    /// 3. Repeat until a round comes out empty
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let keys = graph.keys();
        let mut scheduled: HashSet<String> = HashSet::new();
        let mut rounds: Vec<Vec<String>> = Vec::new();

        loop {
            let round: Vec<String> = keys
                .iter()
                .filter(|key| !scheduled.contains(*key))
                .filter(|key| graph.get(key).is_some_and(|r| !r.shared))
                .filter(|key| graph.blocked_by(key).all(|b| scheduled.contains(b)))
                .cloned()
                .collect();

            if round.is_empty() {
                break;
            }

            debug!(
                round = rounds.len() + 1,
                resources = round.len(),
                "Computed deletion round"
            );

            scheduled.extend(round.iter().cloned());
            rounds.push(round);
        }

        let unschedulable: Vec<String> = keys
            .into_iter()
            .filter(|key| !scheduled.contains(key))
            .collect();

        let round_of = rounds
            .iter()
            .enumerate()
            .flat_map(|(i, round)| round.iter().map(move |key| (key.clone(), i as u32 + 1)))
            .collect();

        info!(
            rounds = rounds.len(),
            scheduled = scheduled.len(),
            unschedulable = unschedulable.len(),
            "Computed deletion plan"
        );

        Self {
            rounds,
            round_of,
            unschedulable,
        }
    }

    /// The rounds in order
    pub fn rounds(&self) -> &[Vec<String>] {
        &self.rounds
    }

    /// Number of rounds
    pub fn num_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Round (1-based) a key is scheduled in
    pub fn round_of(&self, key: &str) -> Option<u32> {
        self.round_of.get(key).copied()
    }

    /// Keys that would never be deleted: shared, blocked by shared, or in a cycle
    pub fn unschedulable(&self) -> &[String] {
        &self.unschedulable
    }

    /// All scheduled keys in deletion order (flattened)
    pub fn deletion_order(&self) -> Vec<String> {
        self.rounds.iter().flatten().cloned().collect()
    }
}

//! End-to-end reclamation scenarios against an in-memory cloud
//!
//! The fake cloud enforces ordering the way a real provider does: deleting a
//! resource fails while anything that blocks it still exists. A run that
//! violates ordering therefore shows up as failed resources, not just as a
//! wrong log order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lattice_reclaim::{
    BackoffConfig, ClusterIdentity, Deleter, FinalState, OperationError, PendingReason,
    ReclaimError, ReclaimOptions, ReclaimReport, ReclaimStatus, Reclaimer, Resource,
    ResourceLister, StopReason,
};
use rand::prelude::*;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Fake cloud
// =============================================================================

#[derive(Clone)]
struct Spec {
    kind: &'static str,
    id: String,
    blocks: Vec<String>,
    shared: bool,
    cluster: String,
    /// Transient failures to return before succeeding
    failures: u32,
}

fn spec(key: &str, blocks: &[&str]) -> Spec {
    let (kind, id) = key.split_once(':').unwrap();
    let kind: &'static str = Box::leak(kind.to_string().into_boxed_str());
    Spec {
        kind,
        id: id.to_string(),
        blocks: blocks.iter().map(|b| b.to_string()).collect(),
        shared: false,
        cluster: "prod".to_string(),
        failures: 0,
    }
}

impl Spec {
    fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }

    fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    fn failing(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    fn owned_by(mut self, cluster: &str) -> Self {
        self.cluster = cluster.to_string();
        self
    }
}

#[derive(Default)]
struct CloudState {
    existing: BTreeMap<String, Spec>,
    remaining_failures: HashMap<String, u32>,
    deleted: Vec<String>,
    calls: usize,
}

#[derive(Clone, Default)]
struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    fn new(specs: Vec<Spec>) -> Self {
        let cloud = Self::default();
        {
            let mut state = cloud.state.lock().unwrap();
            for s in specs {
                state.remaining_failures.insert(s.key(), s.failures);
                state.existing.insert(s.key(), s);
            }
        }
        cloud
    }

    fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    fn exists(&self, key: &str) -> bool {
        self.state.lock().unwrap().existing.contains_key(key)
    }

    fn delete(&self, key: &str) -> Result<(), OperationError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;

        if !state.existing.contains_key(key) {
            return Err(OperationError::already_gone(key));
        }
        if let Some(holder) = state
            .existing
            .values()
            .find(|s| s.blocks.iter().any(|b| b == key))
        {
            return Err(OperationError::fatal(format!(
                "{} is in use by {}",
                key,
                holder.key()
            )));
        }
        if let Some(left) = state.remaining_failures.get_mut(key) {
            if *left > 0 {
                *left -= 1;
                return Err(OperationError::transient("RetryableError: conflict"));
            }
        }

        state.existing.remove(key);
        state.deleted.push(key.to_string());
        Ok(())
    }

    /// One lister per kind present, in a given kind order
    fn listers(&self, kinds: &[&'static str]) -> Vec<Arc<dyn ResourceLister>> {
        kinds
            .iter()
            .map(|kind| {
                Arc::new(KindLister {
                    kind,
                    cloud: self.clone(),
                }) as Arc<dyn ResourceLister>
            })
            .collect()
    }

    fn all_kinds(&self) -> Vec<&'static str> {
        let kinds: BTreeSet<&'static str> = self
            .state
            .lock()
            .unwrap()
            .existing
            .values()
            .map(|s| s.kind)
            .collect();
        kinds.into_iter().collect()
    }
}

struct KindLister {
    kind: &'static str,
    cloud: FakeCloud,
}

#[async_trait]
impl ResourceLister for KindLister {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn list(&self, cluster: &ClusterIdentity) -> Result<Vec<Resource>, OperationError> {
        let specs: Vec<Spec> = self
            .cloud
            .state
            .lock()
            .unwrap()
            .existing
            .values()
            .filter(|s| s.kind == self.kind)
            .cloned()
            .collect();

        Ok(specs
            .into_iter()
            .filter(|s| {
                let tags = BTreeMap::from([(cluster.tag_key.clone(), s.cluster.clone())]);
                cluster.owns(&tags)
            })
            .map(|s| {
                let cloud = self.cloud.clone();
                Resource::new(
                    s.kind,
                    s.id.clone(),
                    Deleter::new(move |r: Arc<Resource>| {
                        let cloud = cloud.clone();
                        async move { cloud.delete(&r.key()) }
                    }),
                )
                .with_blocks(s.blocks.clone())
                .with_shared(s.shared)
            })
            .collect())
    }
}

fn options() -> ReclaimOptions {
    ReclaimOptions::default().with_backoff(BackoffConfig::none())
}

async fn reclaim(cloud: &FakeCloud, options: &ReclaimOptions) -> ReclaimReport {
    Reclaimer::new(cloud.listers(&cloud.all_kinds()))
        .reclaim(&ClusterIdentity::new("prod"), options, &CancellationToken::new())
        .await
        .unwrap()
}

fn network_topology() -> Vec<Spec> {
    vec![
        spec("resource-group:rg1", &[]),
        spec("network:net1", &["resource-group:rg1"]),
        spec("subnet:sn1", &["network:net1", "resource-group:rg1"]),
    ]
}

// =============================================================================
// Story: Ordered deletion
// =============================================================================

#[tokio::test]
async fn subnet_network_resource_group_take_three_rounds() {
    let cloud = FakeCloud::new(network_topology());

    let report = reclaim(&cloud, &options()).await;

    assert_eq!(report.status(), ReclaimStatus::Reclaimed);
    assert_eq!(report.rounds, 3);
    assert_eq!(cloud.deleted(), vec!["subnet:sn1", "network:net1", "resource-group:rg1"]);
    assert_eq!(report.resource("subnet:sn1").unwrap().round, Some(1));
    assert_eq!(report.resource("network:net1").unwrap().round, Some(2));
    assert_eq!(report.resource("resource-group:rg1").unwrap().round, Some(3));
}

#[tokio::test]
async fn transient_failures_are_absorbed() {
    let cloud = FakeCloud::new(vec![
        spec("resource-group:rg1", &[]),
        spec("network:net1", &["resource-group:rg1"]).failing(2),
        spec("subnet:sn1", &["network:net1", "resource-group:rg1"]),
    ]);

    let report = reclaim(&cloud, &options()).await;

    assert_eq!(report.status(), ReclaimStatus::Reclaimed);
    assert!(report.resources.iter().all(|r| r.state == FinalState::Done));

    let net = report.resource("network:net1").unwrap();
    assert_eq!(net.transient_failures, 2);
    assert_eq!(net.attempts, 3);
    assert_eq!(net.round, Some(4));
    assert_eq!(report.resource("resource-group:rg1").unwrap().round, Some(5));
}

#[tokio::test]
async fn foreign_resources_are_never_touched() {
    let cloud = FakeCloud::new(vec![
        spec("disk:mine", &[]),
        spec("disk:theirs", &[]).owned_by("staging"),
        spec("disk:prefix", &[]).owned_by("prod-2"),
    ]);

    let report = reclaim(&cloud, &options()).await;

    assert_eq!(report.resources.len(), 1);
    assert_eq!(cloud.deleted(), vec!["disk:mine"]);
    assert!(cloud.exists("disk:theirs"));
    assert!(cloud.exists("disk:prefix"));
}

// =============================================================================
// Story: Shared resources
// =============================================================================

#[tokio::test]
async fn shared_subnet_holds_back_what_it_blocks() {
    let cloud = FakeCloud::new(vec![
        spec("resource-group:rg1", &[]),
        spec("network:net1", &["resource-group:rg1"]),
        spec("subnet:sn1", &["network:net1", "resource-group:rg1"]).shared(),
        spec("disk:d1", &["resource-group:rg1"]),
    ]);

    let report = reclaim(&cloud, &options()).await;

    assert_eq!(report.status(), ReclaimStatus::ReclaimedExceptShared);
    assert!(report.into_result().is_ok());
    assert_eq!(cloud.deleted(), vec!["disk:d1"]);
    assert!(cloud.exists("subnet:sn1"));
}

#[tokio::test]
async fn shared_resources_report_their_reasons() {
    let cloud = FakeCloud::new(vec![
        spec("resource-group:rg1", &[]),
        spec("network:net1", &["resource-group:rg1"]),
        spec("subnet:sn1", &["network:net1", "resource-group:rg1"]).shared(),
    ]);

    let report = reclaim(&cloud, &options()).await;

    let sn1 = report.resource("subnet:sn1").unwrap();
    assert_eq!(sn1.state, FinalState::Pending);
    assert_eq!(sn1.pending_reason, Some(PendingReason::Shared));
    assert_eq!(sn1.attempts, 0);

    let net1 = report.resource("network:net1").unwrap();
    assert_eq!(net1.pending_reason, Some(PendingReason::BlockedByShared));
    assert_eq!(net1.blockers, vec!["subnet:sn1"]);

    let rg1 = report.resource("resource-group:rg1").unwrap();
    assert_eq!(rg1.pending_reason, Some(PendingReason::BlockedByShared));
    assert_eq!(rg1.blockers, vec!["network:net1", "subnet:sn1"]);

    assert_eq!(cloud.calls(), 0);
    assert_ne!(report.status(), ReclaimStatus::Stuck);
}

// =============================================================================
// Story: Edge cases
// =============================================================================

#[tokio::test]
async fn dangling_blocks_never_prevent_completion() {
    let cloud = FakeCloud::new(vec![
        spec("network:net1", &["resource-group:elsewhere", "nsg:gone"]),
        spec("disk:d1", &["network:not-listed"]),
    ]);

    let report = reclaim(&cloud, &options()).await;

    assert_eq!(report.status(), ReclaimStatus::Reclaimed);
    assert_eq!(report.rounds, 1);
}

#[tokio::test]
async fn rerunning_a_finished_reclaim_is_a_no_op() {
    let cloud = FakeCloud::new(network_topology());
    reclaim(&cloud, &options()).await;
    let calls_after_first = cloud.calls();

    let report = reclaim(&cloud, &options()).await;

    assert_eq!(cloud.calls(), calls_after_first);
    assert!(report.resources.is_empty());
    assert_eq!(report.rounds, 0);
    assert_eq!(report.status(), ReclaimStatus::Reclaimed);
}

#[tokio::test]
async fn done_resources_are_skipped() {
    let calls = Arc::new(Mutex::new(0u32));
    let counted = calls.clone();
    let deleter = Deleter::new(move |_| {
        let counted = counted.clone();
        async move {
            *counted.lock().unwrap() += 1;
            Ok(())
        }
    });

    struct Fixed(Vec<Resource>);

    #[async_trait]
    impl ResourceLister for Fixed {
        fn kind(&self) -> &'static str {
            "disk"
        }
        async fn list(&self, _: &ClusterIdentity) -> Result<Vec<Resource>, OperationError> {
            Ok(self.0.clone())
        }
    }

    let lister = Fixed(vec![
        Resource::new("disk", "d1", deleter.clone()).with_done(true),
        Resource::new("disk", "d2", deleter.clone()).with_done(true),
    ]);

    let report = Reclaimer::new(vec![Arc::new(lister)])
        .reclaim(&ClusterIdentity::new("prod"), &options(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*calls.lock().unwrap(), 0);
    assert!(report.resources.is_empty());
}

#[tokio::test]
async fn cycle_is_diagnosed_not_looped() {
    let cloud = FakeCloud::new(vec![
        spec("network:a", &["network:b"]),
        spec("network:b", &["network:a"]),
        spec("disk:d1", &[]),
    ]);

    let report = reclaim(&cloud, &options()).await;

    assert_eq!(report.stop_reason, StopReason::Stuck);
    assert_eq!(report.status(), ReclaimStatus::Stuck);
    assert_eq!(cloud.deleted(), vec!["disk:d1"]);

    match report.into_result() {
        Err(ReclaimError::StuckResources { resources }) => {
            let keys: Vec<&str> = resources.iter().map(|r| r.key.as_str()).collect();
            assert_eq!(keys, vec!["network:a", "network:b"]);
            assert_eq!(resources[0].blockers, vec!["network:b"]);
            assert_eq!(resources[1].blockers, vec!["network:a"]);
        }
        other => panic!("expected StuckResources, got {:?}", other.map(|r| r.status())),
    }
}

#[tokio::test]
async fn fatal_failure_blocks_dependents_but_not_siblings() {
    let cloud = FakeCloud::new(vec![
        spec("resource-group:rg1", &[]),
        spec("network:net1", &["resource-group:rg1"]).failing(u32::MAX),
        spec("disk:d1", &[]),
    ]);

    let report = reclaim(&cloud, &options().with_max_attempts(3)).await;

    assert_eq!(report.status(), ReclaimStatus::Failed);
    assert_eq!(cloud.deleted(), vec!["disk:d1"]);

    let net = report.resource("network:net1").unwrap();
    assert_eq!(net.state, FinalState::Failed);
    assert_eq!(net.attempts, 3);
    assert_eq!(
        report.resource("resource-group:rg1").unwrap().pending_reason,
        Some(PendingReason::BlockedByFailure)
    );
}

#[tokio::test]
async fn round_budget_leaves_the_rest_pending() {
    let cloud = FakeCloud::new(network_topology());

    let report = reclaim(&cloud, &options().with_max_rounds(2)).await;

    assert_eq!(report.stop_reason, StopReason::RoundBudgetExhausted);
    assert_eq!(report.status(), ReclaimStatus::Incomplete);
    assert_eq!(cloud.deleted(), vec!["subnet:sn1", "network:net1"]);

    // A second run finishes the job
    let report = reclaim(&cloud, &options()).await;
    assert_eq!(report.status(), ReclaimStatus::Reclaimed);
    assert_eq!(cloud.deleted().last().map(String::as_str), Some("resource-group:rg1"));
}

// =============================================================================
// Story: Order independence
// =============================================================================

/// Random acyclic topology: resource i may only block resources j < i
fn random_dag(rng: &mut StdRng, size: usize) -> Vec<Spec> {
    let kinds = ["resource-group", "network", "subnet", "disk", "load-balancer"];
    let keys: Vec<String> = (0..size)
        .map(|i| format!("{}:r{:03}", kinds[i % kinds.len()], i))
        .collect();

    keys.iter()
        .enumerate()
        .map(|(i, key)| {
            let blocks: Vec<&str> = (0..i)
                .filter(|_| rng.gen_bool(0.2))
                .map(|j| keys[j].as_str())
                .collect();
            spec(key, &blocks)
        })
        .collect()
}

#[tokio::test]
async fn random_acyclic_topologies_fully_reclaim_in_order() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..20 {
        let size = rng.gen_range(1..40);
        let specs = random_dag(&mut rng, size);
        let blocks: HashMap<String, Vec<String>> =
            specs.iter().map(|s| (s.key(), s.blocks.clone())).collect();
        let cloud = FakeCloud::new(specs);

        let report = reclaim(&cloud, &options().with_concurrency(4)).await;

        assert_eq!(report.status(), ReclaimStatus::Reclaimed);
        assert_eq!(cloud.deleted().len(), size);

        // Every resource is deleted in a strictly later round than anything blocking it
        for (key, blocked) in &blocks {
            let round = report.resource(key).unwrap().round.unwrap();
            for b in blocked {
                assert!(report.resource(b).unwrap().round.unwrap() > round);
            }
        }
    }
}

#[tokio::test]
async fn listing_order_does_not_change_the_outcome() {
    let mut rng = StdRng::seed_from_u64(42);
    let specs = random_dag(&mut rng, 25);

    let baseline = {
        let cloud = FakeCloud::new(specs.clone());
        summarize(&reclaim(&cloud, &options()).await)
    };

    for _ in 0..10 {
        let cloud = FakeCloud::new(specs.clone());
        let mut kinds = cloud.all_kinds();
        kinds.shuffle(&mut rng);

        let report = Reclaimer::new(cloud.listers(&kinds))
            .reclaim(&ClusterIdentity::new("prod"), &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summarize(&report), baseline);
    }
}

fn summarize(report: &ReclaimReport) -> Vec<(String, FinalState, Option<u32>)> {
    report
        .resources
        .iter()
        .map(|r| (r.key.clone(), r.state, r.round))
        .collect()
}

// =============================================================================
// Story: Dry run
// =============================================================================

#[tokio::test]
async fn dry_run_matches_the_real_run() {
    let mut rng = StdRng::seed_from_u64(3);
    let specs = random_dag(&mut rng, 30);

    let planned = reclaim(&FakeCloud::new(specs.clone()), &options().with_dry_run(true)).await;
    let cloud = FakeCloud::new(specs);
    let real = reclaim(&cloud, &options()).await;

    assert_eq!(planned.status(), ReclaimStatus::Planned);
    assert_eq!(planned.rounds, real.rounds);
    for r in &real.resources {
        assert_eq!(planned.resource(&r.key).unwrap().round, r.round, "{}", r.key);
    }
}

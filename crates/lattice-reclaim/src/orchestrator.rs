//! Round-based deletion orchestrator
//!
//! Drives every resource in a [`DependencyGraph`] from pending to deleted:
//!
//! ```text
//! Pending ──► Deletable ──► Deleting ──► Done
//!    ▲                         │
//!    └── Failed(Retryable) ◄───┤
//!                              └──► Failed(Fatal)
//! ```
//!
//! Each round computes the deletable set (pending, not shared, every present
//! blocker done), runs those deleters concurrently, then waits for all of
//! them before touching any state. The next round only starts once the
//! round's outcomes are applied, so deletability always reflects completed
//! deletions rather than graph shape.
//!
//! The loop ends when nothing is deletable. Remaining resources are then
//! classified: blocked by a shared resource, blocked by a fatally failed
//! resource, or stuck in (or behind) a cycle.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{OperationError, StuckResource};
use crate::graph::DependencyGraph;
use crate::options::ReclaimOptions;
use crate::resource::Resource;

/// Why a failed deletion will or will not be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Failure {
    /// Back to pending for the next round
    Retryable,
    /// Excluded from further rounds
    Fatal,
}

/// Orchestrator-owned state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceState {
    /// Waiting for blockers or for the next round
    Pending,
    /// Selected for the current round
    Deletable,
    /// Deleter in flight
    Deleting,
    /// Deleted, or found already gone
    Done,
    /// Last deletion attempt failed
    Failed(Failure),
}

/// Why a resource is left undeleted when the run stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingReason {
    /// The resource itself is shared and never deleted
    Shared,
    /// Every chain of unresolved blockers ends at a shared resource
    BlockedByShared,
    /// The run stopped before this resource (or its blockers) could be attempted
    Interrupted,
    /// A chain of unresolved blockers ends at a fatally failed resource
    BlockedByFailure,
    /// Part of, or behind, a blocking cycle
    Stuck,
    /// Dry run: scheduled but not attempted
    Planned,
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Shared => "shared",
            Self::BlockedByShared => "blocked by shared",
            Self::Interrupted => "interrupted",
            Self::BlockedByFailure => "blocked by failure",
            Self::Stuck => "stuck",
            Self::Planned => "planned",
        };
        f.write_str(s)
    }
}

/// Why the orchestrator stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Nothing left that could be deleted
    Completed,
    /// Non-shared resources remain that can never become deletable
    Stuck,
    /// `max_rounds` reached
    RoundBudgetExhausted,
    /// The whole-run timeout passed
    DeadlineExceeded,
    /// The caller cancelled
    Cancelled,
    /// Dry run, nothing attempted
    DryRun,
}

impl StopReason {
    /// Whether the run was cut short before converging
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::RoundBudgetExhausted | Self::DeadlineExceeded | Self::Cancelled
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Stuck => "stuck",
            Self::RoundBudgetExhausted => "round budget exhausted",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::Cancelled => "cancelled",
            Self::DryRun => "dry run",
        };
        f.write_str(s)
    }
}

/// Per-resource bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStatus {
    /// Current state
    pub state: ResourceState,
    /// Deleter calls that returned an outcome
    pub attempts: u32,
    /// Of those, how many failed with a retryable error
    pub transient_failures: u32,
    /// Round in which the resource was deleted
    pub deleted_in_round: Option<u32>,
    /// Last error reported by the deleter
    pub last_error: Option<String>,
}

impl ResourceStatus {
    fn new() -> Self {
        Self {
            state: ResourceState::Pending,
            attempts: 0,
            transient_failures: 0,
            deleted_in_round: None,
            last_error: None,
        }
    }

    fn is_done(&self) -> bool {
        self.state == ResourceState::Done
    }

    fn is_fatal(&self) -> bool {
        self.state == ResourceState::Failed(Failure::Fatal)
    }
}

/// Outcome of a single deleter invocation
#[derive(Debug)]
enum DeleteOutcome {
    Deleted,
    AlreadyGone,
    Failed(OperationError),
    Interrupted,
}

/// Drives a graph to a fixed point
pub struct Orchestrator<'a> {
    graph: &'a DependencyGraph,
    options: &'a ReclaimOptions,
    deadline: Option<Instant>,
    statuses: HashMap<String, ResourceStatus>,
    rounds: u32,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator with every resource pending
    pub fn new(
        graph: &'a DependencyGraph,
        options: &'a ReclaimOptions,
        deadline: Option<Instant>,
    ) -> Self {
        let statuses = graph
            .keys()
            .into_iter()
            .map(|key| (key, ResourceStatus::new()))
            .collect();

        Self {
            graph,
            options,
            deadline,
            statuses,
            rounds: 0,
        }
    }

    /// Number of rounds run so far
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Status of a resource
    pub fn status(&self, key: &str) -> Option<&ResourceStatus> {
        self.statuses.get(key)
    }

    /// Mark resources done without calling their deleters
    ///
    /// Used by dry runs to classify what a fully successful run would leave behind.
    pub(crate) fn assume_deleted<'k>(&mut self, keys: impl IntoIterator<Item = &'k String>) {
        for key in keys {
            if let Some(status) = self.statuses.get_mut(key) {
                status.state = ResourceState::Done;
            }
        }
    }

    /// Run rounds until nothing is deletable or the run is interrupted
    pub async fn run(&mut self, cancel: &CancellationToken) -> StopReason {
        loop {
            if cancel.is_cancelled() {
                warn!(rounds = self.rounds, "Reclamation cancelled");
                return StopReason::Cancelled;
            }
            if self.deadline_passed() {
                warn!(rounds = self.rounds, "Reclamation deadline exceeded");
                return StopReason::DeadlineExceeded;
            }

            let deletable = self.deletable();
            if deletable.is_empty() {
                let stuck = self.stuck_resources();
                if stuck.is_empty() {
                    info!(rounds = self.rounds, "No deletable resources remain");
                    return StopReason::Completed;
                }
                for s in &stuck {
                    error!(resource = %s.key, blockers = ?s.blockers, "Resource cannot make progress");
                }
                return StopReason::Stuck;
            }

            if self.options.max_rounds.is_some_and(|max| self.rounds >= max) {
                warn!(
                    rounds = self.rounds,
                    remaining = deletable.len(),
                    "Round budget exhausted"
                );
                return StopReason::RoundBudgetExhausted;
            }

            if !self.wait_before_retry(&deletable, cancel).await {
                // Loop back to report cancellation or deadline
                continue;
            }

            self.rounds += 1;
            self.run_round(deletable, cancel).await;
        }
    }

    /// Pending, non-shared resources whose present blockers are all done
    fn deletable(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .statuses
            .iter()
            .filter(|(_, s)| s.state == ResourceState::Pending)
            .map(|(k, _)| k)
            .filter(|key| self.graph.get(key).is_some_and(|r| !r.shared))
            .filter(|key| self.unresolved_blockers(key).is_empty())
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Present blockers of `key` that are not yet done
    fn unresolved_blockers(&self, key: &str) -> Vec<String> {
        self.graph
            .blocked_by(key)
            .filter(|b| !self.statuses.get(*b).is_some_and(ResourceStatus::is_done))
            .map(String::from)
            .collect()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Back off when the round re-attempts resources that already failed
    ///
    /// Returns false if cancelled or the deadline passed while waiting.
    async fn wait_before_retry(&self, deletable: &[String], cancel: &CancellationToken) -> bool {
        let retry_attempt = deletable
            .iter()
            .filter_map(|k| self.statuses.get(k))
            .map(|s| s.transient_failures)
            .max()
            .unwrap_or(0);

        let delay = self.options.backoff.delay(retry_attempt);
        if delay.is_zero() {
            return true;
        }

        debug!(
            attempt = retry_attempt,
            delay_ms = delay.as_millis() as u64,
            "Backing off before retry round"
        );

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = wait_for_deadline(self.deadline) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Run every deletable resource's deleter and apply the outcomes
    async fn run_round(&mut self, deletable: Vec<String>, cancel: &CancellationToken) {
        let round = self.rounds;
        info!(round = round, deletable = deletable.len(), "Starting deletion round");

        let mut work = Vec::with_capacity(deletable.len());
        for key in deletable {
            let Some(resource) = self.graph.get(&key).cloned() else {
                continue;
            };
            if let Some(status) = self.statuses.get_mut(&key) {
                status.state = ResourceState::Deletable;
            }
            work.push((key, resource));
        }

        for (key, _) in &work {
            if let Some(status) = self.statuses.get_mut(key) {
                status.state = ResourceState::Deleting;
            }
        }

        let timeout = self.options.operation_timeout;
        let deadline = self.deadline;
        // At most `concurrency` deleters run at once
        let pool = Semaphore::new(self.options.concurrency);
        let outcomes: Vec<(String, DeleteOutcome)> =
            join_all(work.into_iter().map(|(key, resource)| {
                let pool = &pool;
                async move {
                    let _permit = pool.acquire().await;
                    debug!(resource = %key, "Deleting resource");
                    let outcome = invoke_deleter(resource, timeout, cancel, deadline).await;
                    (key, outcome)
                }
            }))
            .await;

        let mut deleted = 0usize;
        let mut failed = 0usize;
        for (key, outcome) in outcomes {
            match self.apply_outcome(&key, outcome, round) {
                ResourceState::Done => deleted += 1,
                ResourceState::Failed(_) => failed += 1,
                _ => {}
            }
        }

        self.requeue_retryable();

        info!(
            round = round,
            deleted = deleted,
            failed = failed,
            "Deletion round complete"
        );
    }

    /// Record the outcome of one deleter call, returning the new state
    fn apply_outcome(&mut self, key: &str, outcome: DeleteOutcome, round: u32) -> ResourceState {
        let max_attempts = self.options.max_attempts;
        let Some(status) = self.statuses.get_mut(key) else {
            return ResourceState::Pending;
        };

        match outcome {
            DeleteOutcome::Deleted => {
                status.attempts += 1;
                status.state = ResourceState::Done;
                status.deleted_in_round = Some(round);
                info!(resource = %key, round = round, "Deleted resource");
            }
            DeleteOutcome::AlreadyGone => {
                status.attempts += 1;
                status.state = ResourceState::Done;
                status.deleted_in_round = Some(round);
                info!(resource = %key, round = round, "Resource already gone");
            }
            DeleteOutcome::Failed(err) => {
                status.attempts += 1;
                status.last_error = Some(err.to_string());

                if !err.is_retryable() {
                    status.state = ResourceState::Failed(Failure::Fatal);
                    error!(resource = %key, error = %err, "Deletion failed permanently");
                } else {
                    status.transient_failures += 1;
                    if status.attempts >= max_attempts {
                        status.state = ResourceState::Failed(Failure::Fatal);
                        error!(
                            resource = %key,
                            attempts = status.attempts,
                            error = %err,
                            "Deletion failed after max attempts"
                        );
                    } else {
                        status.state = ResourceState::Failed(Failure::Retryable);
                        warn!(
                            resource = %key,
                            attempt = status.attempts,
                            error = %err,
                            "Deletion failed, will retry next round"
                        );
                    }
                }
            }
            DeleteOutcome::Interrupted => {
                status.state = ResourceState::Pending;
                debug!(resource = %key, "Deletion interrupted");
            }
        }

        status.state
    }

    /// Return retryable failures to pending for the next round
    fn requeue_retryable(&mut self) {
        for status in self.statuses.values_mut() {
            if status.state == ResourceState::Failed(Failure::Retryable) {
                status.state = ResourceState::Pending;
            }
        }
    }

    /// Classify every resource that is neither done nor fatally failed
    ///
    /// Works to a fixed point: a resource is explained once each of its
    /// unresolved blockers is shared, fatally failed, or itself explained.
    /// A pending resource with no unresolved blockers is only left over when
    /// the run was interrupted. Whatever stays unexplained sits in or behind
    /// a cycle.
    pub fn pending_reasons(&self) -> BTreeMap<String, PendingReason> {
        let mut reasons: BTreeMap<String, PendingReason> = BTreeMap::new();
        let mut remaining: Vec<&String> = Vec::new();

        for (key, status) in &self.statuses {
            if status.is_done() || status.is_fatal() {
                continue;
            }
            if self.graph.get(key).is_some_and(|r| r.shared) {
                reasons.insert(key.clone(), PendingReason::Shared);
            } else {
                remaining.push(key);
            }
        }
        remaining.sort();

        loop {
            let mut progressed = false;

            for key in &remaining {
                if reasons.contains_key(*key) {
                    continue;
                }

                let mut reason = PendingReason::BlockedByShared;
                let mut explained = true;
                let blockers = self.unresolved_blockers(key);

                if blockers.is_empty() {
                    reason = PendingReason::Interrupted;
                }

                for blocker in &blockers {
                    let blocker_reason = if self.statuses.get(blocker).is_some_and(ResourceStatus::is_fatal) {
                        Some(PendingReason::BlockedByFailure)
                    } else {
                        match reasons.get(blocker) {
                            Some(PendingReason::Shared) => Some(PendingReason::BlockedByShared),
                            Some(r) => Some(*r),
                            None => None,
                        }
                    };

                    match blocker_reason {
                        Some(r) => reason = reason.max(r),
                        None => {
                            explained = false;
                            break;
                        }
                    }
                }

                if explained {
                    reasons.insert((*key).clone(), reason);
                    progressed = true;
                }
            }

            if !progressed {
                break;
            }
        }

        for key in remaining {
            reasons.entry(key.clone()).or_insert(PendingReason::Stuck);
        }

        reasons
    }

    /// Resources in or behind a cycle, with their unresolved blockers
    pub fn stuck_resources(&self) -> Vec<StuckResource> {
        self.pending_reasons()
            .into_iter()
            .filter(|(_, reason)| *reason == PendingReason::Stuck)
            .map(|(key, _)| StuckResource {
                blockers: self.unresolved_blockers(&key),
                key,
            })
            .collect()
    }

    /// Unresolved blockers of a resource, for reporting
    pub fn blockers_of(&self, key: &str) -> Vec<String> {
        self.unresolved_blockers(key)
    }
}

/// Run one deleter under the per-operation timeout, cancellation and deadline
async fn invoke_deleter(
    resource: Arc<Resource>,
    timeout: Duration,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> DeleteOutcome {
    let call = tokio::time::timeout(timeout, resource.deleter.call(resource.clone()));

    tokio::select! {
        _ = cancel.cancelled() => DeleteOutcome::Interrupted,
        _ = wait_for_deadline(deadline) => DeleteOutcome::Interrupted,
        result = call => match result {
            Ok(Ok(())) => DeleteOutcome::Deleted,
            Ok(Err(e)) if e.is_already_gone() => DeleteOutcome::AlreadyGone,
            Ok(Err(e)) => DeleteOutcome::Failed(e),
            Err(_) => DeleteOutcome::Failed(OperationError::Timeout { timeout }),
        },
    }
}

/// Resolves at the deadline, or never when there is none
pub(crate) async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

//! Reclamation report
//!
//! The outcome of a run, one entry per resource sorted by key, plus the
//! run-level facts (listing failures, duplicate keys, stop reason) needed to
//! decide whether the cluster's resources are gone.

use std::fmt;

use serde::Serialize;

use crate::error::{FailedResource, ListingFailure, ReclaimError, StuckResource};
use crate::graph::DependencyGraph;
use crate::orchestrator::{Orchestrator, PendingReason, ResourceState, StopReason};
use crate::plan::DeletionPlan;

/// Final state of a resource when the run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FinalState {
    /// Deleted, or already gone
    Done,
    /// Given up on
    Failed,
    /// Not deleted; see the pending reason
    Pending,
}

impl fmt::Display for FinalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReclaimStatus {
    /// Every resource deleted
    Reclaimed,
    /// Everything deleted except shared resources and what they block
    ReclaimedExceptShared,
    /// Some listings failed, so the run may have missed resources
    Degraded,
    /// Some resources were given up on
    Failed,
    /// Some resources can never become deletable
    Stuck,
    /// Cancelled, out of time, or out of rounds
    Incomplete,
    /// Dry run
    Planned,
}

impl ReclaimStatus {
    /// Whether a caller should treat this run as successful
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Reclaimed | Self::ReclaimedExceptShared | Self::Planned
        )
    }
}

impl fmt::Display for ReclaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reclaimed => "reclaimed",
            Self::ReclaimedExceptShared => "reclaimed except shared",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Stuck => "stuck",
            Self::Incomplete => "incomplete",
            Self::Planned => "planned",
        };
        f.write_str(s)
    }
}

/// Per-resource outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReport {
    /// `kind:id`
    pub key: String,
    /// Resource kind
    pub kind: String,
    /// Provider identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Whether the resource is shared
    pub shared: bool,
    /// Final state
    pub state: FinalState,
    /// Why a pending resource was left alone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_reason: Option<PendingReason>,
    /// Present resources still blocking this one
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blockers: Vec<String>,
    /// Deleter calls that returned an outcome
    pub attempts: u32,
    /// Of those, retryable failures
    pub transient_failures: u32,
    /// Round deleted in, or planned round on a dry run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    /// Last deleter error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclaimReport {
    /// Unique id for correlating logs
    pub run_id: String,
    /// Cluster name
    pub cluster: String,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Rounds run, or planned on a dry run
    pub rounds: u32,
    /// Why the run stopped
    pub stop_reason: StopReason,
    /// Resources sorted by key
    pub resources: Vec<ResourceReport>,
    /// Listers that failed
    pub listing_failures: Vec<ListingFailure>,
    /// Keys reported more than once
    pub duplicate_keys: Vec<String>,
}

impl ReclaimReport {
    /// Report for a run that stopped before any resource was listed
    pub(crate) fn interrupted(
        run_id: String,
        cluster: &str,
        dry_run: bool,
        stop_reason: StopReason,
        listing_failures: Vec<ListingFailure>,
    ) -> Self {
        Self {
            run_id,
            cluster: cluster.to_string(),
            dry_run,
            rounds: 0,
            stop_reason,
            resources: Vec::new(),
            listing_failures,
            duplicate_keys: Vec::new(),
        }
    }

    /// Report from a finished orchestrator
    pub(crate) fn from_run(
        run_id: String,
        cluster: &str,
        graph: &DependencyGraph,
        orchestrator: &Orchestrator<'_>,
        stop_reason: StopReason,
        listing_failures: Vec<ListingFailure>,
    ) -> Self {
        let reasons = orchestrator.pending_reasons();

        let resources = graph
            .resources()
            .into_iter()
            .filter_map(|(key, resource)| {
                let status = orchestrator.status(key)?;
                let (state, pending_reason) = match status.state {
                    ResourceState::Done => (FinalState::Done, None),
                    ResourceState::Failed(_) => (FinalState::Failed, None),
                    _ => (FinalState::Pending, reasons.get(key).copied()),
                };
                let blockers = if state == FinalState::Pending {
                    orchestrator.blockers_of(key)
                } else {
                    Vec::new()
                };

                Some(ResourceReport {
                    key: key.to_string(),
                    kind: resource.kind.clone(),
                    id: resource.id.clone(),
                    name: resource.name.clone(),
                    shared: resource.shared,
                    state,
                    pending_reason,
                    blockers,
                    attempts: status.attempts,
                    transient_failures: status.transient_failures,
                    round: status.deleted_in_round,
                    error: status.last_error.clone(),
                })
            })
            .collect();

        Self {
            run_id,
            cluster: cluster.to_string(),
            dry_run: false,
            rounds: orchestrator.rounds(),
            stop_reason,
            resources,
            listing_failures,
            duplicate_keys: graph.duplicates().to_vec(),
        }
    }

    /// Report for a dry run
    ///
    /// Scheduled resources are `Planned` with their round. Unschedulable
    /// ones carry the reason a fully successful run would leave them behind.
    pub(crate) fn from_plan(
        run_id: String,
        cluster: &str,
        graph: &DependencyGraph,
        plan: &DeletionPlan,
        options: &crate::options::ReclaimOptions,
        listing_failures: Vec<ListingFailure>,
    ) -> Self {
        let mut simulated = Orchestrator::new(graph, options, None);
        simulated.assume_deleted(plan.rounds().iter().flatten());
        let reasons = simulated.pending_reasons();

        let resources = graph
            .resources()
            .into_iter()
            .map(|(key, resource)| {
                let round = plan.round_of(key);
                let (pending_reason, blockers) = match round {
                    Some(_) => (Some(PendingReason::Planned), Vec::new()),
                    None => (reasons.get(key).copied(), simulated.blockers_of(key)),
                };

                ResourceReport {
                    key: key.to_string(),
                    kind: resource.kind.clone(),
                    id: resource.id.clone(),
                    name: resource.name.clone(),
                    shared: resource.shared,
                    state: FinalState::Pending,
                    pending_reason,
                    blockers,
                    attempts: 0,
                    transient_failures: 0,
                    round,
                    error: None,
                }
            })
            .collect();

        Self {
            run_id,
            cluster: cluster.to_string(),
            dry_run: true,
            rounds: plan.num_rounds() as u32,
            stop_reason: StopReason::DryRun,
            resources,
            listing_failures,
            duplicate_keys: graph.duplicates().to_vec(),
        }
    }

    /// Look up a resource by key
    pub fn resource(&self, key: &str) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| r.key == key)
    }

    /// Resources in a given final state
    pub fn in_state(&self, state: FinalState) -> impl Iterator<Item = &ResourceReport> {
        self.resources.iter().filter(move |r| r.state == state)
    }

    /// Resources left pending for a given reason
    pub fn pending_for(&self, reason: PendingReason) -> impl Iterator<Item = &ResourceReport> {
        self.resources
            .iter()
            .filter(move |r| r.pending_reason == Some(reason))
    }

    /// Overall status
    ///
    /// Precedence: stuck, failed, incomplete, degraded, then the success
    /// statuses. A dry run is `Planned` unless a listing failed.
    pub fn status(&self) -> ReclaimStatus {
        if self.dry_run {
            return if self.listing_failures.is_empty() {
                ReclaimStatus::Planned
            } else {
                ReclaimStatus::Degraded
            };
        }
        if self.stop_reason == StopReason::Stuck {
            return ReclaimStatus::Stuck;
        }
        if self.in_state(FinalState::Failed).next().is_some() {
            return ReclaimStatus::Failed;
        }
        if self.stop_reason.is_interrupted() {
            return ReclaimStatus::Incomplete;
        }
        if !self.listing_failures.is_empty() {
            return ReclaimStatus::Degraded;
        }
        if self.in_state(FinalState::Pending).next().is_some() {
            return ReclaimStatus::ReclaimedExceptShared;
        }
        ReclaimStatus::Reclaimed
    }

    /// The run-level error matching a non-success status
    pub fn error(&self) -> Option<ReclaimError> {
        match self.status() {
            ReclaimStatus::Reclaimed | ReclaimStatus::ReclaimedExceptShared | ReclaimStatus::Planned => None,
            ReclaimStatus::Stuck => Some(ReclaimError::StuckResources {
                resources: self
                    .pending_for(PendingReason::Stuck)
                    .map(|r| StuckResource {
                        key: r.key.clone(),
                        blockers: r.blockers.clone(),
                    })
                    .collect(),
            }),
            ReclaimStatus::Failed => Some(ReclaimError::ResourcesFailed {
                resources: self
                    .in_state(FinalState::Failed)
                    .map(|r| FailedResource {
                        key: r.key.clone(),
                        message: r.error.clone().unwrap_or_default(),
                    })
                    .collect(),
            }),
            ReclaimStatus::Incomplete => Some(ReclaimError::Incomplete {
                reason: self.incomplete_reason(),
            }),
            ReclaimStatus::Degraded => Some(ReclaimError::Listing {
                failures: self.listing_failures.clone(),
            }),
        }
    }

    /// `Ok(self)` on success statuses, the matching error otherwise
    pub fn into_result(self) -> Result<Self, ReclaimError> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    fn incomplete_reason(&self) -> String {
        let remaining = self.in_state(FinalState::Pending).count();
        let cause = match self.stop_reason {
            StopReason::Cancelled => "cancelled",
            StopReason::DeadlineExceeded => "deadline exceeded",
            StopReason::RoundBudgetExhausted => "round budget exhausted",
            _ => "stopped early",
        };
        format!(
            "{} after {} rounds, {} resources remaining",
            cause, self.rounds, remaining
        )
    }
}

//! Dependency-ordered reclamation of a cluster's cloud resources
//!
//! Given a cluster name, lists every cloud resource the cluster owns, works
//! out which resources must go before which, and deletes them in rounds until
//! nothing deletable remains.
//!
//! ## Architecture
//!
//! ```text
//! ResourceLister (per kind) ──┐
//! ResourceLister (per kind) ──┼──► DependencyGraph ──► Orchestrator ──► ReclaimReport
//! ResourceLister (per kind) ──┘         │                  │
//!                                       │                  └─ round N: delete every resource
//!                                       │                     whose blockers are all done
//!                                       └─► DeletionPlan (dry run)
//! ```
//!
//! Each [`Resource`] declares the keys it `blocks`: resources that cannot be
//! deleted while it exists (a subnet blocks its network). The graph inverts
//! these into `blocked_by` sets. Shared resources are listed so they can
//! block, but are never deleted.
//!
//! ## Failure model
//!
//! - Retryable deleter errors send a resource back to pending for a later
//!   round, up to `max_attempts`.
//! - Fatal errors exclude the resource; whatever it blocks stays pending.
//! - Cycles are detected when a round has nothing deletable, and reported
//!   with each stuck resource's blockers.
//! - Cancellation and the run deadline abort in-flight calls; interrupted
//!   resources keep no attempt record, so re-running picks up where this
//!   run stopped.

#![deny(missing_docs)]

mod adapter;
mod backoff;
mod error;
mod graph;
mod options;
mod orchestrator;
mod ownership;
mod plan;
mod reclaim;
mod report;
mod resource;

pub use adapter::ResourceLister;
pub use backoff::BackoffConfig;
pub use error::{FailedResource, ListingFailure, OperationError, ReclaimError, StuckResource};
pub use graph::{BuildMode, DanglingBlock, DependencyGraph};
pub use options::{
    ReclaimOptions, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_OPERATION_TIMEOUT,
};
pub use orchestrator::{Failure, Orchestrator, PendingReason, ResourceState, ResourceStatus, StopReason};
pub use ownership::{is_owned_by_cluster, normalize_tags, ClusterIdentity, CLUSTER_NAME_TAG};
pub use plan::DeletionPlan;
pub use reclaim::Reclaimer;
pub use report::{FinalState, ReclaimReport, ReclaimStatus, ResourceReport};
pub use resource::{resource_key, DeleteFuture, Deleter, Resource};

/// Result alias for run-level operations
pub type Result<T, E = ReclaimError> = std::result::Result<T, E>;

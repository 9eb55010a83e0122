//! Reclamation entry point
//!
//! Runs the whole pipeline for one cluster:
//! 1. Validate options
//! 2. List every resource kind concurrently
//! 3. Build the dependency graph
//! 4. Plan (dry run) or delete in rounds
//! 5. Assemble the report

use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::ResourceLister;
use crate::error::{ListingFailure, OperationError, ReclaimError};
use crate::graph::DependencyGraph;
use crate::options::ReclaimOptions;
use crate::orchestrator::{wait_for_deadline, Orchestrator, StopReason};
use crate::ownership::ClusterIdentity;
use crate::report::ReclaimReport;
use crate::resource::Resource;

/// Outcome of listing a single kind
enum ListOutcome {
    Listed(Vec<Resource>),
    Failed(ListingFailure),
    Interrupted,
}

/// Reclaims a cluster's resources through a set of listers
#[derive(Clone, Default)]
pub struct Reclaimer {
    listers: Vec<Arc<dyn ResourceLister>>,
}

impl Reclaimer {
    /// Create a reclaimer over the given listers
    pub fn new(listers: Vec<Arc<dyn ResourceLister>>) -> Self {
        Self { listers }
    }

    /// Add a lister
    pub fn with_lister(mut self, lister: Arc<dyn ResourceLister>) -> Self {
        self.listers.push(lister);
        self
    }

    /// Kinds covered by the registered listers
    pub fn kinds(&self) -> Vec<&'static str> {
        self.listers.iter().map(|l| l.kind()).collect()
    }

    /// Delete everything the listers report for `cluster`, in dependency order
    ///
    /// Only invalid options and strict-mode duplicate keys return `Err`.
    /// Every other problem (listing failures, failed or stuck resources,
    /// cancellation) is folded into the report; use
    /// [`ReclaimReport::into_result`] to turn those into an error.
    pub async fn reclaim(
        &self,
        cluster: &ClusterIdentity,
        options: &ReclaimOptions,
        cancel: &CancellationToken,
    ) -> Result<ReclaimReport, ReclaimError> {
        options.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let deadline = options.timeout.map(|t| Instant::now() + t);

        info!(
            run_id = %run_id,
            cluster = %cluster.name,
            listers = self.listers.len(),
            dry_run = options.dry_run,
            "Starting reclamation"
        );

        let (resources, listing_failures, interrupted) =
            self.list_all(cluster, options, cancel, deadline).await;

        if interrupted {
            let stop_reason = if cancel.is_cancelled() {
                StopReason::Cancelled
            } else {
                StopReason::DeadlineExceeded
            };
            warn!(run_id = %run_id, reason = ?stop_reason, "Reclamation interrupted while listing");
            return Ok(ReclaimReport::interrupted(
                run_id,
                &cluster.name,
                options.dry_run,
                stop_reason,
                listing_failures,
            ));
        }

        let graph = DependencyGraph::build(resources, options.build_mode())?;

        let report = if options.dry_run {
            let plan = graph.plan();
            ReclaimReport::from_plan(
                run_id,
                &cluster.name,
                &graph,
                &plan,
                options,
                listing_failures,
            )
        } else {
            let mut orchestrator = Orchestrator::new(&graph, options, deadline);
            let stop_reason = orchestrator.run(cancel).await;
            ReclaimReport::from_run(
                run_id,
                &cluster.name,
                &graph,
                &orchestrator,
                stop_reason,
                listing_failures,
            )
        };

        info!(
            run_id = %report.run_id,
            cluster = %report.cluster,
            rounds = report.rounds,
            resources = report.resources.len(),
            status = %report.status(),
            "Reclamation finished"
        );

        Ok(report)
    }

    /// Run every lister concurrently and join the results
    ///
    /// Returns the concatenated resources, the failed listings, and whether
    /// cancellation or the deadline cut listing short.
    async fn list_all(
        &self,
        cluster: &ClusterIdentity,
        options: &ReclaimOptions,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> (Vec<Resource>, Vec<ListingFailure>, bool) {
        let futures = self
            .listers
            .iter()
            .map(|lister| list_one(lister.as_ref(), cluster, options, cancel, deadline));
        let outcomes = join_all(futures).await;

        let mut resources = Vec::new();
        let mut failures = Vec::new();
        let mut interrupted = false;

        for outcome in outcomes {
            match outcome {
                ListOutcome::Listed(listed) => resources.extend(listed),
                ListOutcome::Failed(failure) => failures.push(failure),
                ListOutcome::Interrupted => interrupted = true,
            }
        }

        info!(
            resources = resources.len(),
            failed_listings = failures.len(),
            "Listed cluster resources"
        );

        (resources, failures, interrupted)
    }
}

/// List one kind, retrying retryable errors with backoff up to `max_attempts`
async fn list_one(
    lister: &dyn ResourceLister,
    cluster: &ClusterIdentity,
    options: &ReclaimOptions,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> ListOutcome {
    let kind = lister.kind();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let call = tokio::time::timeout(options.operation_timeout, lister.list(cluster));
        let result = tokio::select! {
            _ = cancel.cancelled() => return ListOutcome::Interrupted,
            _ = wait_for_deadline(deadline) => return ListOutcome::Interrupted,
            result = call => result.unwrap_or_else(|_| Err(OperationError::Timeout {
                timeout: options.operation_timeout,
            })),
        };

        let err = match result {
            Ok(resources) => {
                debug!(kind = kind, count = resources.len(), "Listed resources");
                return ListOutcome::Listed(resources);
            }
            // The scope being listed (e.g. a resource group) was already deleted
            Err(e) if e.is_already_gone() => {
                debug!(kind = kind, error = %e, "Listing scope is gone, nothing to list");
                return ListOutcome::Listed(Vec::new());
            }
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= options.max_attempts {
            warn!(kind = kind, attempt = attempt, error = %err, "Listing failed");
            return ListOutcome::Failed(ListingFailure {
                kind: kind.to_string(),
                message: err.to_string(),
            });
        }

        let delay = options.backoff.delay(attempt);
        warn!(
            kind = kind,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Listing failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return ListOutcome::Interrupted,
            _ = wait_for_deadline(deadline) => return ListOutcome::Interrupted,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

//! Error types for resource reclamation
//!
//! Two layers of errors exist:
//! - [`OperationError`] is what a single adapter call (list or delete) reports.
//!   The orchestrator classifies it to decide between success, retry and
//!   giving up on a resource.
//! - [`ReclaimError`] is what a whole reclamation run reports. Per-resource
//!   failures never abort a run; they are folded into the report and only
//!   surface as a `ReclaimError` through [`crate::ReclaimReport::error`].

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors reported by a single list or delete call against the provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The object no longer exists. Deletion treats this as success.
    #[error("already gone: {0}")]
    AlreadyGone(String),

    /// Throttling, conflicts, dependent objects still draining
    #[error("transient failure: {0}")]
    Transient(String),

    /// Permission denied, malformed request, or anything retrying cannot fix
    #[error("fatal failure: {0}")]
    Fatal(String),

    /// The call did not finish within the per-operation timeout
    #[error("operation timed out after {timeout:?}")]
    Timeout {
        /// The per-operation timeout that elapsed
        timeout: Duration,
    },
}

impl OperationError {
    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a fatal error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Create an already-gone error
    pub fn already_gone(msg: impl Into<String>) -> Self {
        Self::AlreadyGone(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout { .. })
    }

    /// Check if this error means the object is already deleted
    pub fn is_already_gone(&self) -> bool {
        matches!(self, Self::AlreadyGone(_))
    }
}

/// A resource that cannot make progress, with the blockers holding it back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StuckResource {
    /// Key of the stuck resource
    pub key: String,
    /// Keys of present, not-yet-deleted resources that block it
    pub blockers: Vec<String>,
}

impl fmt::Display for StuckResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (blocked by {})", self.key, self.blockers.join(", "))
    }
}

/// An adapter that failed to enumerate its resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingFailure {
    /// Kind reported by the failing lister
    pub kind: String,
    /// Error message
    pub message: String,
}

impl fmt::Display for ListingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A resource given up on after a fatal error or exhausted retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedResource {
    /// Key of the failed resource
    pub key: String,
    /// Last error reported by its deleter
    pub message: String,
}

impl fmt::Display for FailedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Errors from a reclamation run
#[derive(Debug, Error)]
pub enum ReclaimError {
    /// Two descriptors share a key (strict mode only)
    #[error("duplicate resource key {key}")]
    DuplicateKey {
        /// The conflicting key
        key: String,
    },

    /// Options failed validation
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The graph cannot make progress
    #[error("{} resources cannot make progress: {}", .resources.len(), join(.resources))]
    StuckResources {
        /// Every stalled resource with its unresolved blockers
        resources: Vec<StuckResource>,
    },

    /// Some resources were given up on
    #[error("{} resources failed to delete: {}", .resources.len(), join(.resources))]
    ResourcesFailed {
        /// Failed resources with their last error
        resources: Vec<FailedResource>,
    },

    /// One or more adapters failed to list their resources
    #[error("{} listings failed: {}", .failures.len(), join(.failures))]
    Listing {
        /// Failed listings
        failures: Vec<ListingFailure>,
    },

    /// The run stopped before converging
    #[error("reclamation incomplete: {reason}")]
    Incomplete {
        /// Why the run stopped
        reason: String,
    },
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

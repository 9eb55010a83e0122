//! Provider adapter contract
//!
//! One lister per resource kind. Listers are read-only and run concurrently;
//! everything they return is handed to the graph builder in one batch.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::OperationError;
use crate::ownership::ClusterIdentity;
use crate::resource::Resource;

/// Lists the cluster's resources of one kind
///
/// Implementations must apply the ownership filter themselves, fill in
/// `blocks` with keys from the whole graph (references to other adapters'
/// resources are expected), and return deleters that are safe to call at
/// most once per run.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// Name of the resource kind, used in logs and listing failures
    fn kind(&self) -> &'static str;

    /// List owned resources of this kind
    async fn list(&self, cluster: &ClusterIdentity) -> Result<Vec<Resource>, OperationError>;
}

//! Resource descriptors produced by provider adapters
//!
//! A [`Resource`] is the unit the engine reasons about. Adapters create one
//! per discovered cloud object, fill in the keys of the resources it blocks,
//! and attach a [`Deleter`] that knows how to remove the object.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::OperationError;

/// Future returned by a deleter
pub type DeleteFuture = BoxFuture<'static, Result<(), OperationError>>;

/// Build the key of a resource from its kind and provider ID
pub fn resource_key(kind: &str, id: &str) -> String {
    format!("{}:{}", kind, id)
}

/// Deletion capability carried by every resource
///
/// Adapters close over whatever client and identifiers they need. The
/// orchestrator hands the resource back in so deleters can read its name or
/// opaque payload without capturing them separately.
#[derive(Clone)]
pub struct Deleter(Arc<dyn Fn(Arc<Resource>) -> DeleteFuture + Send + Sync>);

impl Deleter {
    /// Wrap an async closure as a deleter
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Resource>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        Self(Arc::new(move |resource| Box::pin(f(resource))))
    }

    /// Invoke the deleter for a resource
    pub fn call(&self, resource: Arc<Resource>) -> DeleteFuture {
        (self.0)(resource)
    }
}

impl fmt::Debug for Deleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deleter")
    }
}

/// A discovered cloud resource
#[derive(Clone)]
pub struct Resource {
    /// Resource kind tag (e.g. "VirtualNetwork")
    pub kind: String,
    /// Provider-assigned ID, used for keying
    pub id: String,
    /// Display name, also used by deleters
    pub name: String,
    /// Owned by something other than this cluster; never deleted
    pub shared: bool,
    /// Already reclaimed or not applicable; dropped before orchestration
    pub done: bool,
    /// Keys of resources that may only be deleted after this one
    pub blocks: Vec<String>,
    /// Deletion capability
    pub deleter: Deleter,
    /// Adapter-specific payload, only read by the adapter's own deleter
    pub obj: Option<Arc<dyn Any + Send + Sync>>,
}

impl Resource {
    /// Create a resource whose name equals its ID
    pub fn new(kind: impl Into<String>, id: impl Into<String>, deleter: Deleter) -> Self {
        let id = id.into();
        Self {
            kind: kind.into(),
            name: id.clone(),
            id,
            shared: false,
            done: false,
            blocks: Vec::new(),
            deleter,
            obj: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the keys this resource blocks
    pub fn with_blocks(mut self, blocks: Vec<String>) -> Self {
        self.blocks = blocks;
        self
    }

    /// Mark the resource as shared
    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Mark the resource as already done
    pub fn with_done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    /// Attach an opaque payload
    pub fn with_obj<T: Any + Send + Sync>(mut self, obj: T) -> Self {
        self.obj = Some(Arc::new(obj));
        self
    }

    /// Key of this resource: `kind:id`
    pub fn key(&self) -> String {
        resource_key(&self.kind, &self.id)
    }

    /// Downcast the opaque payload
    pub fn obj_as<T: Any>(&self) -> Option<&T> {
        self.obj.as_deref().and_then(|o| o.downcast_ref::<T>())
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shared", &self.shared)
            .field("done", &self.done)
            .field("blocks", &self.blocks)
            .finish_non_exhaustive()
    }
}

//! ClusterApi trait for mocking
//!
//! This trait abstracts the cluster resource API so the watch core can be
//! exercised against an in-memory implementation in unit tests.

use crate::error::ClusterError;
use crate::selector::{ResourceKind, ResourceSelector};
use crate::subscription::Subscription;
use kube::api::DynamicObject;

/// Trait for cluster resource API operations
///
/// All calls distinguish "not found" (`ClusterError::NotFound`) from other
/// failures. All async methods must be `Send` to work with Tokio's
/// work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch the current snapshot of one object.
    async fn get(&self, selector: &ResourceSelector) -> Result<DynamicObject, ClusterError>;

    /// List objects of a kind, optionally restricted to a namespace and a label selector
    /// (`key=value[,key=value]`, empty for all).
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError>;

    /// Create an object. Its namespace is taken from its metadata.
    async fn create(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject, ClusterError>;

    /// Delete one object.
    async fn delete(&self, selector: &ResourceSelector) -> Result<(), ClusterError>;

    /// Set `spec.replicas` on a scalable workload.
    async fn scale(&self, selector: &ResourceSelector, replicas: i32) -> Result<(), ClusterError>;

    /// Open a change stream filtered to exactly the selected object.
    ///
    /// Construction failures (unsupported kind, authorization) are returned
    /// here, never as a later stream item.
    async fn subscribe(&self, selector: &ResourceSelector) -> Result<Subscription, ClusterError>;
}

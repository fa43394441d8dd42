//! Desired-state predicates.
//!
//! A `DesiredState` is a pure test over an object snapshot. The built-in ones
//! read the standard status fields of the kinds the workflows wait on.

use cluster_client::{DynamicObject, ResourceKind};
use serde_json::Value;
use std::sync::Arc;

/// Caller-supplied test of whether a snapshot counts as ready.
pub type DesiredState = Arc<dyn Fn(&DynamicObject) -> bool + Send + Sync>;

/// Wrap a closure as a `DesiredState`.
pub fn desired<F>(check: F) -> DesiredState
where
    F: Fn(&DynamicObject) -> bool + Send + Sync + 'static,
{
    Arc::new(check)
}

fn field<'a>(object: &'a DynamicObject, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(&object.data, |value, key| value.get(*key))
}

/// Pod phase is `Running`.
pub fn pod_running() -> DesiredState {
    desired(|pod| field(pod, &["status", "phase"]).and_then(Value::as_str) == Some("Running"))
}

/// PersistentVolumeClaim phase is `Bound`.
pub fn pvc_bound() -> DesiredState {
    desired(|pvc| field(pvc, &["status", "phase"]).and_then(Value::as_str) == Some("Bound"))
}

/// Workload has observed its latest generation and every desired replica is available.
pub fn workload_available() -> DesiredState {
    desired(|workload| {
        let wanted = field(workload, &["spec", "replicas"]).and_then(Value::as_i64).unwrap_or(1);
        let available = field(workload, &["status", "availableReplicas"])
            .or_else(|| field(workload, &["status", "readyReplicas"]))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let observed = field(workload, &["status", "observedGeneration"]).and_then(Value::as_i64);
        let generation = workload.metadata.generation;
        let up_to_date = match (observed, generation) {
            (Some(observed), Some(generation)) => observed >= generation,
            _ => true,
        };
        up_to_date && available >= wanted
    })
}

/// Service has been assigned a cluster IP.
pub fn service_has_cluster_ip() -> DesiredState {
    desired(|service| service_cluster_ip(service).is_some())
}

/// The cluster IP of a Service snapshot, ignoring headless (`None`) services.
pub fn service_cluster_ip(service: &DynamicObject) -> Option<&str> {
    field(service, &["spec", "clusterIP"])
        .and_then(Value::as_str)
        .filter(|ip| !ip.is_empty() && *ip != "None")
}

/// The default readiness predicate for a kind, where one is defined.
pub fn readiness_for(kind: ResourceKind) -> Option<DesiredState> {
    match kind {
        ResourceKind::Pod => Some(pod_running()),
        ResourceKind::PersistentVolumeClaim => Some(pvc_bound()),
        ResourceKind::Deployment | ResourceKind::StatefulSet | ResourceKind::ReplicaSet => {
            Some(workload_available())
        }
        ResourceKind::Service => Some(service_has_cluster_ip()),
        _ => None,
    }
}

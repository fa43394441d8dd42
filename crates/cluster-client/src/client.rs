//! Kubernetes-backed cluster client
//!
//! Implements `ClusterApi` over `kube::Api<DynamicObject>`. Every call resolves
//! the kind to its `ApiResource` and scopes the API to the selector's namespace
//! when the kind is namespaced.

use crate::cluster_trait::ClusterApi;
use crate::error::ClusterError;
use crate::event::ChangeEvent;
use crate::selector::{ResourceKind, ResourceSelector};
use crate::subscription::Subscription;
use futures::{StreamExt, TryStreamExt};
use kube::Client;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, WatchParams};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Server-side watch timeout in seconds (must stay below 295)
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Buffered events per subscription before the feeder waits on the consumer
const SUBSCRIPTION_BUFFER: usize = 64;

/// Aborts a subscription's feeder task unless it is handed over.
///
/// Covers the window in which `subscribe` waits for the watch to be
/// established; dropping that future must not leave the watch running.
struct FeederGuard(Option<AbortHandle>);

impl FeederGuard {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for FeederGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Cluster client backed by a live Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Create a cluster client from an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a cluster client from the ambient kubeconfig or in-cluster config
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = kind.api_resource();
        match namespace {
            Some(ns) if kind.is_namespaced() => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }
}

impl std::fmt::Debug for KubeClusterApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterApi").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get(&self, selector: &ResourceSelector) -> Result<DynamicObject, ClusterError> {
        debug!("Fetching {}", selector);
        self.api(selector.kind, selector.namespace.as_deref())
            .get(&selector.name)
            .await
            .map_err(|e| ClusterError::from_kube(e, &selector.to_string()))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }
        debug!("Listing {} in {} ({})", kind, namespace.unwrap_or("all namespaces"), label_selector);
        let list = self.api(kind, namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject, ClusterError> {
        let selector = ResourceSelector::for_object(kind, object)?;
        debug!("Creating {}", selector);
        self.api(kind, selector.namespace.as_deref())
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| ClusterError::from_kube(e, &selector.to_string()))
    }

    async fn delete(&self, selector: &ResourceSelector) -> Result<(), ClusterError> {
        debug!("Deleting {}", selector);
        self.api(selector.kind, selector.namespace.as_deref())
            .delete(&selector.name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, &selector.to_string()))
    }

    async fn scale(&self, selector: &ResourceSelector, replicas: i32) -> Result<(), ClusterError> {
        if !selector.kind.is_scalable() {
            return Err(ClusterError::InvalidRequest(format!("{} cannot be scaled", selector.kind)));
        }
        debug!("Scaling {} to {} replicas", selector, replicas);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        self.api(selector.kind, selector.namespace.as_deref())
            .patch(&selector.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, &selector.to_string()))
    }

    async fn subscribe(&self, selector: &ResourceSelector) -> Result<Subscription, ClusterError> {
        let api = self.api(selector.kind, selector.namespace.as_deref());
        let params = WatchParams::default()
            .fields(&selector.field_selector())
            .timeout(WATCH_TIMEOUT_SECS);
        let (event_tx, event_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();
        let label = selector.to_string();

        // The feeder owns the API handle and the raw watch stream; the watch
        // request itself is made before `ready` is signalled so that
        // construction errors surface from this call.
        let feeder = tokio::spawn(async move {
            let stream = match api.watch(&params, "0").await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let mut stream = std::pin::pin!(stream);
            loop {
                let item = match stream.try_next().await {
                    Ok(Some(event)) => match ChangeEvent::from_watch_event(event) {
                        Some(item) => item,
                        None => continue,
                    },
                    Ok(None) => break,
                    Err(e) => Err(ClusterError::Kube(e)),
                };
                let is_err = item.is_err();
                if event_tx.send(item).await.is_err() {
                    // Consumer went away
                    break;
                }
                if is_err {
                    break;
                }
            }
            debug!("Watch stream for {} ended", label);
        });
        let guard = FeederGuard(Some(feeder.abort_handle()));

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Failed to subscribe to {}: {}", selector, e);
                return Err(ClusterError::Subscription(format!("{}: {}", selector, e)));
            }
            Err(_) => {
                return Err(ClusterError::Subscription(format!(
                    "{}: watch task exited before the stream was established",
                    selector
                )));
            }
        }

        guard.disarm();
        debug!("Subscribed to {}", selector);
        Ok(Subscription::new(selector.clone(), ReceiverStream::new(event_rx).boxed())
            .with_feeder(feeder.abort_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropped_guard_aborts_feeder() {
        let feeder = tokio::spawn(std::future::pending::<()>());
        drop(FeederGuard(Some(feeder.abort_handle())));
        assert!(feeder.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_disarmed_guard_leaves_feeder_running() {
        let (tx, rx) = oneshot::channel::<()>();
        let feeder = tokio::spawn(async move {
            let _ = rx.await;
        });
        FeederGuard(Some(feeder.abort_handle())).disarm();
        tokio::task::yield_now().await;
        assert!(!feeder.is_finished());

        tx.send(()).unwrap();
        feeder.await.unwrap();
    }
}

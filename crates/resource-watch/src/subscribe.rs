//! Subscription helpers
//!
//! Open change streams for one or several objects. Construction failures are
//! returned synchronously and never leave a stream running.

use cluster_client::{ClusterApi, ClusterError, ResourceKind, ResourceSelector, Subscription};
use tracing::{debug, warn};

/// Open a subscription for an object named by a kind string.
///
/// Unsupported kinds fail with `ClusterError::UnsupportedKind` before any
/// request is made. `namespace` is ignored for cluster-scoped kinds.
pub async fn subscribe_named(
    api: &dyn ClusterApi,
    kind: &str,
    namespace: &str,
    name: &str,
) -> Result<Subscription, ClusterError> {
    let kind: ResourceKind = kind.parse()?;
    let selector = if kind.is_namespaced() {
        ResourceSelector::namespaced(kind, namespace, name)
    } else {
        ResourceSelector::cluster_scoped(kind, name)
    };
    api.subscribe(&selector).await
}

/// Open one subscription per selector, in order.
///
/// If any of them fails, the ones already opened are stopped before the error
/// is returned.
pub async fn subscribe_all(
    api: &dyn ClusterApi,
    selectors: &[ResourceSelector],
) -> Result<Vec<Subscription>, ClusterError> {
    let mut opened = Vec::with_capacity(selectors.len());
    for selector in selectors {
        match api.subscribe(selector).await {
            Ok(subscription) => opened.push(subscription),
            Err(e) => {
                warn!("Failed to subscribe to {}: {}", selector, e);
                for mut subscription in opened {
                    subscription.stop();
                }
                return Err(e);
            }
        }
    }
    debug!("Opened {} subscriptions", opened.len());
    Ok(opened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockClusterApi;

    #[tokio::test]
    async fn test_unsupported_kind_fails_synchronously() {
        let mock = MockClusterApi::new();
        let err = subscribe_named(&mock, "FooBar", "ns", "x").await.unwrap_err();
        assert!(matches!(err, ClusterError::UnsupportedKind(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_cluster_scoped_kind_drops_namespace() {
        let mock = MockClusterApi::new();
        let sub = subscribe_named(&mock, "persistentvolume", "ignored", "pv-1").await.unwrap();
        assert_eq!(sub.selector(), &ResourceSelector::cluster_scoped(ResourceKind::PersistentVolume, "pv-1"));
    }

    #[tokio::test]
    async fn test_partial_failure_stops_opened_subscriptions() {
        let mock = MockClusterApi::new();
        mock.deny_subscriptions(ResourceKind::Secret);
        let selectors = vec![
            ResourceSelector::namespaced(ResourceKind::Pod, "ns", "a"),
            ResourceSelector::namespaced(ResourceKind::Pod, "ns", "b"),
            ResourceSelector::namespaced(ResourceKind::Secret, "ns", "creds"),
        ];

        assert!(subscribe_all(&mock, &selectors).await.is_err());
        assert_eq!(mock.total_subscriptions(&selectors[0]), 1);
        assert_eq!(mock.open_subscriptions(&selectors[0]), 0);
        assert_eq!(mock.open_subscriptions(&selectors[1]), 0);
    }
}

//! Concurrent waits joined into one result
//!
//! Every request runs on its own task. The joined result succeeds only if all
//! waits succeed; otherwise it carries the first failure observed. Later
//! failures are logged and dropped. All workers are always joined, so no
//! subscription outlives the call.

use crate::error::WaitError;
use crate::watcher::{Completion, WatchRequest};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Run all `requests` concurrently and wait for every one of them.
///
/// Completions are returned in request order. An empty request list succeeds
/// immediately.
pub async fn watch_all(requests: Vec<WatchRequest>) -> Result<Vec<Completion>, WaitError> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let total = requests.len();
    let first_failure: Arc<Mutex<Option<WaitError>>> = Arc::new(Mutex::new(None));
    let mut workers = JoinSet::new();

    for (index, request) in requests.into_iter().enumerate() {
        let first_failure = Arc::clone(&first_failure);
        workers.spawn(async move {
            let selector = request.subscription.selector().to_string();
            let outcome = request.run().await;
            if let Err(e) = &outcome {
                record_failure(&first_failure, e.clone());
                debug!("Wait {} on {} failed: {}", index, selector, e);
            }
            (index, outcome.ok())
        });
    }

    let mut completions: Vec<Option<Completion>> = vec![None; total];
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((index, completion)) => completions[index] = completion,
            Err(e) => {
                warn!("Watch worker did not finish: {}", e);
                record_failure(&first_failure, WaitError::WorkerAborted(e.to_string()));
            }
        }
    }

    let failure = first_failure.lock().unwrap_or_else(PoisonError::into_inner).take();
    match failure {
        Some(e) => Err(e),
        None => completions
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| WaitError::WorkerAborted("missing wait result".to_string())),
    }
}

fn record_failure(slot: &Mutex<Option<WaitError>>, error: WaitError) {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        None => *slot = Some(error),
        Some(_) => warn!("Additional wait failure: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::pod_running;
    use cluster_client::{ClusterApi, MockClusterApi, ResourceKind, ResourceSelector};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn pod_selector(name: &str) -> ResourceSelector {
        ResourceSelector::namespaced(ResourceKind::Pod, "ns", name)
    }

    fn pod(name: &str, phase: &str) -> cluster_client::DynamicObject {
        ResourceKind::Pod.object(Some("ns"), name, &[], json!({"status": {"phase": phase}}))
    }

    #[tokio::test]
    async fn test_empty_request_list_succeeds() {
        assert_eq!(watch_all(Vec::new()).await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_all_waits_succeed_in_request_order() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("a", "Running"));
        mock.insert(ResourceKind::Pod, pod("b", "Pending"));

        let requests = vec![
            WatchRequest::until_deleted(mock.subscribe(&pod_selector("a")).await.unwrap()),
            WatchRequest::until(mock.subscribe(&pod_selector("b")).await.unwrap(), pod_running()),
        ];
        mock.apply(ResourceKind::Pod, pod("b", "Running"));
        mock.remove(&pod_selector("a"));

        let completions = watch_all(requests).await.unwrap();
        assert_eq!(completions, vec![Completion::Deleted, Completion::Satisfied]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_wins_and_all_workers_join() {
        let mock = MockClusterApi::new();
        for name in ["a", "b", "c"] {
            mock.insert(ResourceKind::Pod, pod(name, "Running"));
        }

        let mut requests = Vec::new();
        for name in ["a", "b", "c"] {
            let sub = mock.subscribe(&pod_selector(name)).await.unwrap();
            requests.push(WatchRequest::until_deleted(sub).with_timeout(Duration::from_secs(10)));
        }
        // "c" gets a shorter budget so its timeout is the first failure
        requests[2].timeout = Duration::from_secs(2);

        mock.remove(&pod_selector("a"));

        let started = Instant::now();
        let err = watch_all(requests).await.unwrap_err();

        match err {
            WaitError::Timeout { selector, timeout } => {
                assert_eq!(selector, pod_selector("c").to_string());
                assert_eq!(timeout, Duration::from_secs(2));
            }
            other => panic!("Expected timeout, got {other:?}"),
        }
        // The join waits for "b" to time out as well
        assert!(started.elapsed() >= Duration::from_secs(10));
        for name in ["a", "b", "c"] {
            assert_eq!(mock.open_subscriptions(&pod_selector(name)), 0);
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_counts_as_failure() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("a", "Pending"));
        let sub = mock.subscribe(&pod_selector("a")).await.unwrap();

        let exploding = crate::checks::desired(|_| panic!("checker blew up"));
        mock.apply(ResourceKind::Pod, pod("a", "Running"));

        let err = watch_all(vec![WatchRequest::until(sub, exploding)]).await.unwrap_err();
        assert!(matches!(err, WaitError::WorkerAborted(_)), "{err:?}");
        assert_eq!(mock.open_subscriptions(&pod_selector("a")), 0);
    }
}

//! Single-resource wait
//!
//! `watch` consumes one subscription and waits, under an absolute deadline,
//! for the watched object to be deleted or (with a checker) to reach a desired
//! state. The subscription is stopped exactly once on every exit path.

use crate::checks::DesiredState;
use crate::error::WaitError;
use cluster_client::{ChangeEvent, ChangeEventType, Subscription};
use std::fmt;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

/// Wait budget used when the caller does not give one.
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// How a successful wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A Modified snapshot satisfied the checker
    Satisfied,
    /// The object was deleted
    Deleted,
}

/// Result of one wait.
pub type WatchOutcome = Result<Completion, WaitError>;

/// One pending wait: a subscription, an optional desired state and a budget.
///
/// Without a checker only deletion completes the wait.
pub struct WatchRequest {
    pub subscription: Subscription,
    pub checker: Option<DesiredState>,
    pub timeout: Duration,
}

impl WatchRequest {
    /// Wait for the object to be deleted.
    pub fn until_deleted(subscription: Subscription) -> Self {
        Self {
            subscription,
            checker: None,
            timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }

    /// Wait for the object to reach `checker` (or be deleted).
    pub fn until(subscription: Subscription, checker: DesiredState) -> Self {
        Self {
            subscription,
            checker: Some(checker),
            timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the wait to completion.
    pub async fn run(self) -> WatchOutcome {
        watch(self.subscription, self.checker.as_ref(), self.timeout).await
    }
}

impl fmt::Debug for WatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRequest")
            .field("selector", &self.subscription.selector().to_string())
            .field("has_checker", &self.checker.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Wait on `subscription` until deletion, a satisfying update, or `timeout`.
///
/// Added events never complete a wait: they describe a state that may predate
/// the subscription. A Modified snapshot carrying a deletion timestamp fails
/// the wait when a checker is given, since the object can no longer get there.
pub async fn watch(mut subscription: Subscription, checker: Option<&DesiredState>, timeout: Duration) -> WatchOutcome {
    let deadline = Instant::now() + timeout;
    let outcome = wait_for_event(&mut subscription, checker, timeout, deadline).await;
    subscription.stop();
    outcome
}

async fn wait_for_event(
    subscription: &mut Subscription,
    checker: Option<&DesiredState>,
    timeout: Duration,
    deadline: Instant,
) -> WatchOutcome {
    let selector = subscription.selector().to_string();
    loop {
        let next = tokio::select! {
            next = subscription.next_event() => next,
            _ = sleep_until(deadline) => {
                warn!("Timed out after {:?} waiting for {}", timeout, selector);
                return Err(WaitError::Timeout { selector, timeout });
            }
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                return Err(WaitError::Stream {
                    selector,
                    reason: e.to_string(),
                });
            }
            None => return Err(WaitError::StreamClosed(selector)),
        };

        if let Some(completion) = evaluate(&event, checker, &selector)? {
            debug!("Wait on {} completed: {:?}", selector, completion);
            return Ok(completion);
        }
    }
}

fn evaluate(event: &ChangeEvent, checker: Option<&DesiredState>, selector: &str) -> Result<Option<Completion>, WaitError> {
    match (event.event_type, checker) {
        (ChangeEventType::Deleted, _) => Ok(Some(Completion::Deleted)),
        (ChangeEventType::Added, _) | (ChangeEventType::Modified, None) => Ok(None),
        (ChangeEventType::Modified, Some(_)) if event.is_terminating() => {
            Err(WaitError::Terminating(selector.to_string()))
        }
        (ChangeEventType::Modified, Some(check)) => Ok(check(&event.snapshot).then_some(Completion::Satisfied)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::pod_running;
    use cluster_client::{ClusterApi, ClusterError, MockClusterApi, ResourceKind, ResourceSelector};
    use futures::StreamExt;
    use serde_json::json;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn pod(phase: &str) -> cluster_client::DynamicObject {
        ResourceKind::Pod.object(Some("ns"), "web-0", &[], json!({"status": {"phase": phase}}))
    }

    fn selector() -> ResourceSelector {
        ResourceSelector::namespaced(ResourceKind::Pod, "ns", "web-0")
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_no_earlier_than_budget() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("Pending"));
        let sub = mock.subscribe(&selector()).await.unwrap();

        let started = Instant::now();
        let outcome = watch(sub, Some(&pod_running()), Duration::from_secs(5)).await;

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(matches!(outcome, Err(WaitError::Timeout { .. })), "{outcome:?}");
        assert_eq!(mock.open_subscriptions(&selector()), 0);
    }

    #[tokio::test]
    async fn test_first_satisfying_update_completes() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("Pending"));
        let sub = mock.subscribe(&selector()).await.unwrap();

        let waiter = tokio::spawn(async move { watch(sub, Some(&pod_running()), DEFAULT_WATCH_TIMEOUT).await });
        mock.apply(ResourceKind::Pod, pod("ContainerCreating"));
        mock.apply(ResourceKind::Pod, pod("Running"));

        assert_eq!(waiter.await.unwrap(), Ok(Completion::Satisfied));
        assert_eq!(mock.open_subscriptions(&selector()), 0);
    }

    #[tokio::test]
    async fn test_added_event_is_ignored() {
        let mock = MockClusterApi::new();
        let sub = mock.subscribe(&selector()).await.unwrap();

        // Running on Added does not count; the later Deleted ends the wait
        mock.apply(ResourceKind::Pod, pod("Running"));
        mock.remove(&selector());

        let outcome = watch(sub, Some(&pod_running()), DEFAULT_WATCH_TIMEOUT).await;
        assert_eq!(outcome, Ok(Completion::Deleted));
    }

    #[tokio::test]
    async fn test_deletion_completes_without_checker() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("Running"));
        let sub = mock.subscribe(&selector()).await.unwrap();

        mock.apply(ResourceKind::Pod, pod("Running"));
        mock.remove(&selector());

        let outcome = WatchRequest::until_deleted(sub).run().await;
        assert_eq!(outcome, Ok(Completion::Deleted));
    }

    #[tokio::test]
    async fn test_terminating_object_fails_readiness_wait() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("Pending"));
        let sub = mock.subscribe(&selector()).await.unwrap();

        mock.mark_terminating(&selector());

        let outcome = WatchRequest::until(sub, pod_running()).run().await;
        assert!(matches!(outcome, Err(WaitError::Terminating(_))), "{outcome:?}");
    }

    #[tokio::test]
    async fn test_terminating_update_is_ignored_for_deletion_wait() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("Running"));
        let sub = mock.subscribe(&selector()).await.unwrap();

        mock.mark_terminating(&selector());
        mock.remove(&selector());

        let outcome = WatchRequest::until_deleted(sub).run().await;
        assert_eq!(outcome, Ok(Completion::Deleted));
    }

    #[tokio::test]
    async fn test_stream_error_fails_wait() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sub = Subscription::new(selector(), UnboundedReceiverStream::new(rx).boxed());
        tx.send(Err(ClusterError::Watch("410 Gone".to_string()))).unwrap();

        let outcome = watch(sub, None, DEFAULT_WATCH_TIMEOUT).await;
        assert!(matches!(outcome, Err(WaitError::Stream { .. })), "{outcome:?}");
    }

    #[tokio::test]
    async fn test_closed_stream_fails_wait() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<ChangeEvent, ClusterError>>();
        drop(tx);
        let sub = Subscription::new(selector(), UnboundedReceiverStream::new(rx).boxed());

        let outcome = watch(sub, None, DEFAULT_WATCH_TIMEOUT).await;
        assert!(matches!(outcome, Err(WaitError::StreamClosed(_))), "{outcome:?}");
    }
}

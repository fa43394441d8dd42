//! Orchestrated workflows
//!
//! A `Workflow` is an ordered list of steps. Each step performs at most one
//! mutating call and then waits for its effects. Every wait target is resolved
//! and subscribed to before the mutating call, so no effect can be missed.
//! The first failing step aborts the workflow.

pub mod plans;

use crate::checks::DesiredState;
use crate::error::{StepError, WaitError, WorkflowError};
use crate::multiplex::watch_all;
use crate::subscribe::subscribe_all;
use crate::watcher::{DEFAULT_WATCH_TIMEOUT, WatchRequest};
use cluster_client::{ClusterApi, ClusterError, DynamicObject, ResourceKind, ResourceSelector, object_key};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The mutating call a step makes.
#[derive(Debug, Clone)]
pub enum Action {
    /// Only wait
    None,
    /// Create an object; "already exists" counts as success
    Create { kind: ResourceKind, object: DynamicObject },
    /// Delete an object; with `missing_ok`, "not found" counts as success
    Delete { selector: ResourceSelector, missing_ok: bool },
    /// Set the replica count of a workload, which must exist
    Scale { selector: ResourceSelector, replicas: i32 },
}

/// What a wait observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitTarget {
    /// One object
    Resource(ResourceSelector),
    /// Every pod selected by a workload's `spec.selector.matchLabels`,
    /// listed before the step's action
    PodsOf(ResourceSelector),
}

/// One awaited effect of a step.
#[derive(Clone)]
pub struct Wait {
    pub target: WaitTarget,
    /// `None` waits for deletion
    pub checker: Option<DesiredState>,
    pub timeout: Duration,
}

impl Wait {
    pub fn deletion_of(target: WaitTarget) -> Self {
        Self {
            target,
            checker: None,
            timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }

    pub fn readiness_of(target: WaitTarget, checker: DesiredState) -> Self {
        Self {
            target,
            checker: Some(checker),
            timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for Wait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("target", &self.target)
            .field("has_checker", &self.checker.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// An action and the waits that must complete after it.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub action: Action,
    pub waits: Vec<Wait>,
}

impl Step {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            waits: Vec::new(),
        }
    }

    pub fn wait(mut self, wait: Wait) -> Self {
        self.waits.push(wait);
        self
    }
}

/// A named, ordered list of steps.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<Step>,
}

/// What a step's mutating call found.
#[derive(Debug, PartialEq)]
enum Performed {
    Applied,
    /// A create found the object already present
    AlreadyExists,
    /// A tolerant delete found the object already gone
    Missing(ResourceSelector),
}

/// A resolved wait: one concrete object.
struct Pending {
    selector: ResourceSelector,
    checker: Option<DesiredState>,
    timeout: Duration,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn run(&self, api: &dyn ClusterApi) -> Result<(), WorkflowError> {
        info!("Running workflow '{}' ({} steps)", self.name, self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            debug!("Workflow '{}' step {}: {}", self.name, index, step.name);
            if let Err(source) = run_step(api, step).await {
                warn!("Workflow '{}' failed at step '{}': {}", self.name, step.name, source);
                return Err(WorkflowError::Step {
                    workflow: self.name.clone(),
                    step: step.name.clone(),
                    index,
                    source,
                });
            }
        }
        info!("Workflow '{}' completed", self.name);
        Ok(())
    }
}

async fn run_step(api: &dyn ClusterApi, step: &Step) -> Result<(), StepError> {
    let pending = resolve_waits(api, &step.waits).await?;

    let selectors: Vec<ResourceSelector> = pending.iter().map(|p| p.selector.clone()).collect();
    let subscriptions = subscribe_all(api, &selectors).await?;
    let mut requests: Vec<WatchRequest> = subscriptions
        .into_iter()
        .zip(pending)
        .map(|(subscription, wait)| WatchRequest {
            subscription,
            checker: wait.checker,
            timeout: wait.timeout,
        })
        .collect();

    if matches!(step.action, Action::None) {
        requests = release_already_done(api, requests).await?;
    }

    match perform(api, &step.action).await? {
        Performed::Applied => {}
        // The existing object may be settled already and emit nothing further
        Performed::AlreadyExists => requests = release_already_done(api, requests).await?,
        // Nothing of the object is left to wait for
        Performed::Missing(skipped) => requests.retain(|request| request.subscription.selector() != &skipped),
    }

    if requests.is_empty() {
        return Ok(());
    }
    debug!("Step '{}' waiting on {} objects", step.name, requests.len());
    watch_all(requests).await?;
    Ok(())
}

/// Expand wait targets into concrete objects.
async fn resolve_waits(api: &dyn ClusterApi, waits: &[Wait]) -> Result<Vec<Pending>, StepError> {
    let mut pending = Vec::new();
    for wait in waits {
        match &wait.target {
            WaitTarget::Resource(selector) => pending.push(Pending {
                selector: selector.clone(),
                checker: wait.checker.clone(),
                timeout: wait.timeout,
            }),
            WaitTarget::PodsOf(workload) => {
                for pod in pods_of(api, workload).await? {
                    pending.push(Pending {
                        selector: ResourceSelector::for_object(ResourceKind::Pod, &pod)?,
                        checker: wait.checker.clone(),
                        timeout: wait.timeout,
                    });
                }
            }
        }
    }
    Ok(pending)
}

/// Pods selected by a workload. A missing workload owns no pods.
async fn pods_of(api: &dyn ClusterApi, workload: &ResourceSelector) -> Result<Vec<DynamicObject>, StepError> {
    let object = match api.get(workload).await {
        Ok(object) => object,
        Err(e) if e.is_not_found() => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let labels = object
        .data
        .pointer("/spec/selector/matchLabels")
        .and_then(serde_json::Value::as_object)
        .filter(|labels| !labels.is_empty())
        .ok_or_else(|| StepError::InvalidPlan(format!("{} has no spec.selector.matchLabels", workload)))?;

    let label_selector = labels
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|v| format!("{}={}", k, v)))
        .collect::<Vec<_>>()
        .join(",");

    let pods = api.list(ResourceKind::Pod, workload.namespace.as_deref(), &label_selector).await?;
    debug!("{} selects {} pods ({})", workload, pods.len(), label_selector);
    Ok(pods)
}

/// Drop waits whose target already satisfies them (or is already gone).
///
/// A readiness target that is already terminating fails the step at once.
async fn release_already_done(
    api: &dyn ClusterApi,
    requests: Vec<WatchRequest>,
) -> Result<Vec<WatchRequest>, StepError> {
    let mut remaining = Vec::with_capacity(requests.len());
    for mut request in requests {
        let done = match api.get(request.subscription.selector()).await {
            Ok(object) => match &request.checker {
                Some(_) if object.metadata.deletion_timestamp.is_some() => {
                    let selector = request.subscription.selector().to_string();
                    request.subscription.stop();
                    return Err(WaitError::Terminating(selector).into());
                }
                Some(check) => check(&object),
                None => false,
            },
            Err(e) if e.is_not_found() => request.checker.is_none(),
            Err(e) => return Err(e.into()),
        };
        if done {
            debug!("{} already in the desired state", request.subscription.selector());
            request.subscription.stop();
        } else {
            remaining.push(request);
        }
    }
    Ok(remaining)
}

/// Issue the step's mutating call.
///
async fn perform(api: &dyn ClusterApi, action: &Action) -> Result<Performed, ClusterError> {
    match action {
        Action::None => Ok(Performed::Applied),
        Action::Create { kind, object } => match api.create(*kind, object).await {
            Ok(_) => Ok(Performed::Applied),
            Err(e) if e.is_already_exists() => {
                info!("{} {} already exists", kind, object_key(object));
                Ok(Performed::AlreadyExists)
            }
            Err(e) => Err(e),
        },
        Action::Delete { selector, missing_ok } => match api.delete(selector).await {
            Ok(()) => Ok(Performed::Applied),
            Err(e) if *missing_ok && e.is_not_found() => {
                info!("{} already deleted", selector);
                Ok(Performed::Missing(selector.clone()))
            }
            Err(e) => Err(e),
        },
        Action::Scale { selector, replicas } => {
            api.scale(selector, *replicas).await?;
            info!("Scaled {} to {} replicas", selector, replicas);
            Ok(Performed::Applied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::pod_running;
    use cluster_client::MockClusterApi;
    use serde_json::json;

    fn pod(name: &str, phase: &str) -> DynamicObject {
        ResourceKind::Pod.object(Some("ns"), name, &[("app", "web")], json!({"status": {"phase": phase}}))
    }

    fn pod_selector(name: &str) -> ResourceSelector {
        ResourceSelector::namespaced(ResourceKind::Pod, "ns", name)
    }

    #[tokio::test]
    async fn test_pure_wait_releases_satisfied_targets() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("a", "Running"));

        let workflow = Workflow::new("ready").step(
            Step::new("wait", Action::None)
                .wait(Wait::readiness_of(WaitTarget::Resource(pod_selector("a")), pod_running()))
                .wait(Wait::deletion_of(WaitTarget::Resource(pod_selector("gone")))),
        );

        workflow.run(&mock).await.unwrap();
        assert_eq!(mock.open_subscriptions(&pod_selector("a")), 0);
        assert_eq!(mock.total_subscriptions(&pod_selector("a")), 1);
    }

    #[tokio::test]
    async fn test_tolerant_delete_of_missing_object_succeeds() {
        let mock = MockClusterApi::new();
        let workflow = Workflow::new("cleanup").step(
            Step::new(
                "delete",
                Action::Delete {
                    selector: pod_selector("a"),
                    missing_ok: true,
                },
            )
            .wait(Wait::deletion_of(WaitTarget::Resource(pod_selector("a")))),
        );

        workflow.run(&mock).await.unwrap();
        assert_eq!(mock.delete_requests(), vec![pod_selector("a")]);
        assert_eq!(mock.open_subscriptions(&pod_selector("a")), 0);
    }

    #[tokio::test]
    async fn test_strict_delete_of_missing_object_fails_at_that_step() {
        let mock = MockClusterApi::new();
        let workflow = Workflow::new("cleanup").step(Step::new(
            "delete",
            Action::Delete {
                selector: pod_selector("a"),
                missing_ok: false,
            },
        ));

        let err = workflow.run(&mock).await.unwrap_err();
        assert_eq!(err.failed_step(), Some("delete"));
        assert!(matches!(
            err,
            WorkflowError::Step {
                index: 0,
                source: StepError::Cluster(ClusterError::NotFound(_)),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_scale_of_missing_workload_fails() {
        let mock = MockClusterApi::new();
        let deploy = ResourceSelector::namespaced(ResourceKind::Deployment, "ns", "web");
        let workflow = Workflow::new("scale").step(
            Step::new("scale-down", Action::Scale { selector: deploy.clone(), replicas: 0 })
                .wait(Wait::deletion_of(WaitTarget::PodsOf(deploy))),
        );

        let err = workflow.run(&mock).await.unwrap_err();
        assert_eq!(err.failed_step(), Some("scale-down"));
    }

    #[tokio::test]
    async fn test_create_existing_object_is_success() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("a", "Running"));

        let workflow = Workflow::new("create").step(Step::new(
            "create",
            Action::Create {
                kind: ResourceKind::Pod,
                object: pod("a", "Pending"),
            },
        ));
        workflow.run(&mock).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_create_releases_object_that_is_already_ready() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("probe", "Running"));

        let workflow = Workflow::new("rerun").step(
            Step::new(
                "create",
                Action::Create {
                    kind: ResourceKind::Pod,
                    object: pod("probe", "Pending"),
                },
            )
            .wait(
                Wait::readiness_of(WaitTarget::Resource(pod_selector("probe")), pod_running())
                    .with_timeout(Duration::from_secs(60)),
            ),
        );

        let started = tokio::time::Instant::now();
        workflow.run(&mock).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(mock.open_subscriptions(&pod_selector("probe")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pure_wait_on_terminating_target_fails_immediately() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("a", "Running"));
        mock.mark_terminating(&pod_selector("a"));

        let workflow = Workflow::new("ready").step(
            Step::new("wait", Action::None).wait(
                Wait::readiness_of(WaitTarget::Resource(pod_selector("a")), pod_running())
                    .with_timeout(Duration::from_secs(60)),
            ),
        );

        let started = tokio::time::Instant::now();
        let err = workflow.run(&mock).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(
            matches!(
                err,
                WorkflowError::Step {
                    source: StepError::Wait(WaitError::Terminating(_)),
                    ..
                }
            ),
            "{err:?}"
        );
        assert_eq!(mock.open_subscriptions(&pod_selector("a")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_step_stops_remaining_steps() {
        let mock = MockClusterApi::new();
        mock.insert(ResourceKind::Pod, pod("a", "Pending"));
        mock.insert(ResourceKind::Pod, pod("b", "Running"));

        let workflow = Workflow::new("two-steps")
            .step(
                Step::new("wait-a", Action::None).wait(
                    Wait::readiness_of(WaitTarget::Resource(pod_selector("a")), pod_running())
                        .with_timeout(Duration::from_secs(3)),
                ),
            )
            .step(Step::new(
                "delete-b",
                Action::Delete {
                    selector: pod_selector("b"),
                    missing_ok: false,
                },
            ));

        let err = workflow.run(&mock).await.unwrap_err();
        match err {
            WorkflowError::Step {
                step,
                index,
                source: StepError::Wait(WaitError::Timeout { .. }),
                ..
            } => {
                assert_eq!(step, "wait-a");
                assert_eq!(index, 0);
            }
            other => panic!("Expected a timeout in wait-a, got {other:?}"),
        }
        assert!(mock.delete_requests().is_empty());
        assert!(mock.object(&pod_selector("b")).is_some());
    }
}

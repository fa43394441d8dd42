//! Named workflows used by the controller.

use super::{Action, Step, Wait, WaitTarget, Workflow};
use crate::checks::{pod_running, readiness_for};
use crate::error::WorkflowError;
use cluster_client::{DynamicObject, ResourceKind, ResourceSelector};
use serde_json::json;
use std::time::Duration;

/// Budget for each pod of a scaled-down workload to disappear.
pub const TEARDOWN_POD_TIMEOUT: Duration = Duration::from_secs(40);
/// Budget for the sanity probe pod to start.
pub const PROBE_START_TIMEOUT: Duration = Duration::from_secs(60);
/// Driver name under which the kubelet invokes the FlexVolume driver.
pub const FLEX_DRIVER_NAME: &str = "microscaler/flexvol";
/// Image used by the sanity probe pod.
pub const PROBE_IMAGE: &str = "busybox:1.36";

/// Scale `workload` to zero, delete it, then delete every `extra` object.
///
/// Each deletion waits for the object to be gone. Extras that no longer exist
/// are skipped.
pub fn teardown(workload: &ResourceSelector, extra: &[ResourceSelector]) -> Result<Workflow, WorkflowError> {
    if !workload.kind.is_scalable() {
        return Err(WorkflowError::InvalidPlan(format!(
            "{} cannot be scaled down",
            workload
        )));
    }

    let mut workflow = Workflow::new(format!("teardown {}", workload))
        .step(
            Step::new(
                "scale-down",
                Action::Scale {
                    selector: workload.clone(),
                    replicas: 0,
                },
            )
            .wait(Wait::deletion_of(WaitTarget::PodsOf(workload.clone())).with_timeout(TEARDOWN_POD_TIMEOUT)),
        )
        .step(
            Step::new(
                "delete-workload",
                Action::Delete {
                    selector: workload.clone(),
                    missing_ok: true,
                },
            )
            .wait(Wait::deletion_of(WaitTarget::Resource(workload.clone()))),
        );

    for selector in extra {
        workflow = workflow.step(
            Step::new(
                format!("delete-{}-{}", selector.kind.as_str().to_lowercase(), selector.name),
                Action::Delete {
                    selector: selector.clone(),
                    missing_ok: true,
                },
            )
            .wait(Wait::deletion_of(WaitTarget::Resource(selector.clone()))),
        );
    }
    Ok(workflow)
}

/// Pod that mounts `volume_name` through the driver and idles.
pub fn probe_pod(namespace: &str, pod_name: &str, volume_name: &str) -> DynamicObject {
    ResourceKind::Pod.object(
        Some(namespace),
        pod_name,
        &[("app.kubernetes.io/name", "flexvol-probe")],
        json!({
            "spec": {
                "restartPolicy": "Never",
                "containers": [{
                    "name": "probe",
                    "image": PROBE_IMAGE,
                    "command": ["sh", "-c", "ls /data && sleep 3600"],
                    "volumeMounts": [{"name": "data", "mountPath": "/data"}]
                }],
                "volumes": [{
                    "name": "data",
                    "flexVolume": {
                        "driver": FLEX_DRIVER_NAME,
                        "options": {"volumeName": volume_name}
                    }
                }]
            }
        }),
    )
}

/// Start a probe pod using the driver, wait for it to run, then remove it.
pub fn sanity_check(namespace: &str, pod_name: &str, volume_name: &str) -> Workflow {
    let probe = ResourceSelector::namespaced(ResourceKind::Pod, namespace, pod_name);
    Workflow::new(format!("sanity-check {}", probe))
        .step(
            Step::new(
                "create-probe",
                Action::Create {
                    kind: ResourceKind::Pod,
                    object: probe_pod(namespace, pod_name, volume_name),
                },
            )
            .wait(
                Wait::readiness_of(WaitTarget::Resource(probe.clone()), pod_running())
                    .with_timeout(PROBE_START_TIMEOUT),
            ),
        )
        .step(
            Step::new(
                "delete-probe",
                Action::Delete {
                    selector: probe.clone(),
                    missing_ok: false,
                },
            )
            .wait(Wait::deletion_of(WaitTarget::Resource(probe))),
        )
}

/// Wait until every target passes the readiness check for its kind.
pub fn provisioning_wait(targets: &[ResourceSelector], timeout: Duration) -> Result<Workflow, WorkflowError> {
    let mut step = Step::new("wait-ready", Action::None);
    for target in targets {
        let checker = readiness_for(target.kind).ok_or_else(|| {
            WorkflowError::InvalidPlan(format!("No readiness check for kind {}", target.kind))
        })?;
        step = step.wait(Wait::readiness_of(WaitTarget::Resource(target.clone()), checker).with_timeout(timeout));
    }
    Ok(Workflow::new("provisioning-wait").step(step))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_rejects_unscalable_workload() {
        let pod = ResourceSelector::namespaced(ResourceKind::Pod, "ns", "p");
        assert!(matches!(teardown(&pod, &[]), Err(WorkflowError::InvalidPlan(_))));
    }

    #[test]
    fn test_teardown_step_order() {
        let deploy = ResourceSelector::namespaced(ResourceKind::Deployment, "ns", "backend");
        let extra = [
            ResourceSelector::namespaced(ResourceKind::Service, "ns", "backend"),
            ResourceSelector::cluster_scoped(ResourceKind::StorageClass, "flexvol"),
        ];
        let workflow = teardown(&deploy, &extra).unwrap();
        let names: Vec<&str> = workflow.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["scale-down", "delete-workload", "delete-service-backend", "delete-storageclass-flexvol"]
        );
        assert_eq!(workflow.steps[0].waits[0].timeout, TEARDOWN_POD_TIMEOUT);
    }

    #[test]
    fn test_probe_pod_uses_driver() {
        let pod = probe_pod("ns", "probe", "vol-a");
        assert_eq!(pod.data["spec"]["volumes"][0]["flexVolume"]["driver"], FLEX_DRIVER_NAME);
        assert_eq!(pod.data["spec"]["volumes"][0]["flexVolume"]["options"]["volumeName"], "vol-a");
    }

    #[test]
    fn test_provisioning_wait_rejects_kind_without_check() {
        let targets = [ResourceSelector::namespaced(ResourceKind::ConfigMap, "ns", "cfg")];
        assert!(provisioning_wait(&targets, Duration::from_secs(5)).is_err());
    }
}

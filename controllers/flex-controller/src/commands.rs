//! One-shot workflow commands.

use crate::error::ControllerError;
use cluster_client::{ClusterApi, ResourceKind, ResourceSelector};
use resource_watch::workflow::plans::{provisioning_wait, sanity_check, teardown};
use std::time::Duration;
use tracing::info;

/// Parse `kind/name` into a selector, namespaced in `namespace` when the kind is.
pub fn parse_target(target: &str, namespace: &str) -> Result<ResourceSelector, ControllerError> {
    let (kind, name) = target
        .split_once('/')
        .filter(|(kind, name)| !kind.is_empty() && !name.is_empty())
        .ok_or_else(|| ControllerError::InvalidArgument(format!("expected kind/name, got '{}'", target)))?;
    let kind: ResourceKind = kind.parse()?;
    Ok(if kind.is_namespaced() {
        ResourceSelector::namespaced(kind, namespace, name)
    } else {
        ResourceSelector::cluster_scoped(kind, name)
    })
}

/// Scale down and delete `workload`, then delete each extra target.
pub async fn run_teardown(
    api: &dyn ClusterApi,
    namespace: &str,
    workload: &str,
    extra: &[String],
) -> Result<(), ControllerError> {
    let workload = parse_target(workload, namespace)?;
    let extra = extra
        .iter()
        .map(|target| parse_target(target, namespace))
        .collect::<Result<Vec<_>, _>>()?;
    teardown(&workload, &extra)?.run(api).await?;
    info!("Teardown of {} complete", workload);
    Ok(())
}

/// Run a probe pod against `volume`. Without a pod name a unique one is generated.
pub async fn run_sanity_check(
    api: &dyn ClusterApi,
    namespace: &str,
    pod_name: Option<&str>,
    volume: &str,
) -> Result<(), ControllerError> {
    let pod_name = pod_name.map_or_else(probe_name, str::to_string);
    sanity_check(namespace, &pod_name, volume).run(api).await?;
    info!("Sanity check passed: {} mounted {}", pod_name, volume);
    Ok(())
}

/// Wait until every target is ready.
pub async fn run_wait_ready(
    api: &dyn ClusterApi,
    namespace: &str,
    targets: &[String],
    timeout: Duration,
) -> Result<(), ControllerError> {
    let targets = targets
        .iter()
        .map(|target| parse_target(target, namespace))
        .collect::<Result<Vec<_>, _>>()?;
    provisioning_wait(&targets, timeout)?.run(api).await?;
    info!("{} targets ready", targets.len());
    Ok(())
}

fn probe_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("flexvol-probe-{}", &id[..8])
}

//! Resource identity
//!
//! A `ResourceSelector` names exactly one object: its kind, its namespace (for
//! namespaced kinds) and its name. Kinds are limited to the built-in types the
//! FlexVol components touch.

use crate::error::ClusterError;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service,
};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{ApiResource, DynamicObject};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kubernetes kinds that can be read, mutated and watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Service,
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
    PersistentVolume,
    PersistentVolumeClaim,
    StorageClass,
    ConfigMap,
    Secret,
    Namespace,
    Node,
}

impl ResourceKind {
    /// API group/version/plural information for dynamic API access.
    pub fn api_resource(self) -> ApiResource {
        match self {
            ResourceKind::Pod => ApiResource::erase::<Pod>(&()),
            ResourceKind::Service => ApiResource::erase::<Service>(&()),
            ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
            ResourceKind::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
            ResourceKind::DaemonSet => ApiResource::erase::<DaemonSet>(&()),
            ResourceKind::ReplicaSet => ApiResource::erase::<ReplicaSet>(&()),
            ResourceKind::PersistentVolume => ApiResource::erase::<PersistentVolume>(&()),
            ResourceKind::PersistentVolumeClaim => ApiResource::erase::<PersistentVolumeClaim>(&()),
            ResourceKind::StorageClass => ApiResource::erase::<StorageClass>(&()),
            ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
            ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
            ResourceKind::Namespace => ApiResource::erase::<Namespace>(&()),
            ResourceKind::Node => ApiResource::erase::<Node>(&()),
        }
    }

    /// Whether objects of this kind live inside a namespace.
    pub fn is_namespaced(self) -> bool {
        !matches!(
            self,
            ResourceKind::PersistentVolume
                | ResourceKind::StorageClass
                | ResourceKind::Namespace
                | ResourceKind::Node
        )
    }

    /// Whether the kind has a `spec.replicas` field that can be scaled.
    pub fn is_scalable(self) -> bool {
        matches!(
            self,
            ResourceKind::Deployment | ResourceKind::StatefulSet | ResourceKind::ReplicaSet
        )
    }

    /// Canonical kind name as used in manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Service => "Service",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::ReplicaSet => "ReplicaSet",
            ResourceKind::PersistentVolume => "PersistentVolume",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::StorageClass => "StorageClass",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Node => "Node",
        }
    }

    /// Build an object of this kind with the given identity, labels and body.
    ///
    /// `data` carries everything except `apiVersion`, `kind` and `metadata`
    /// (typically `{"spec": ..., "status": ...}`).
    pub fn object(
        self,
        namespace: Option<&str>,
        name: &str,
        labels: &[(&str, &str)],
        data: serde_json::Value,
    ) -> DynamicObject {
        let mut object = DynamicObject::new(name, &self.api_resource()).data(data);
        if let (true, Some(ns)) = (self.is_namespaced(), namespace) {
            object = object.within(ns);
        }
        if !labels.is_empty() {
            object.metadata.labels = Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
            );
        }
        object
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "pod" | "pods" => ResourceKind::Pod,
            "service" | "services" | "svc" => ResourceKind::Service,
            "deployment" | "deployments" | "deploy" => ResourceKind::Deployment,
            "statefulset" | "statefulsets" | "sts" => ResourceKind::StatefulSet,
            "daemonset" | "daemonsets" | "ds" => ResourceKind::DaemonSet,
            "replicaset" | "replicasets" | "rs" => ResourceKind::ReplicaSet,
            "persistentvolume" | "persistentvolumes" | "pv" => ResourceKind::PersistentVolume,
            "persistentvolumeclaim" | "persistentvolumeclaims" | "pvc" => {
                ResourceKind::PersistentVolumeClaim
            }
            "storageclass" | "storageclasses" | "sc" => ResourceKind::StorageClass,
            "configmap" | "configmaps" | "cm" => ResourceKind::ConfigMap,
            "secret" | "secrets" => ResourceKind::Secret,
            "namespace" | "namespaces" | "ns" => ResourceKind::Namespace,
            "node" | "nodes" => ResourceKind::Node,
            _ => return Err(ClusterError::UnsupportedKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Immutable identity of one watched object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceSelector {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceSelector {
    /// Selector for an object inside a namespace.
    pub fn namespaced(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Selector for a cluster-scoped object.
    pub fn cluster_scoped(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    /// Selector naming an existing object snapshot.
    pub fn for_object(kind: ResourceKind, object: &DynamicObject) -> Result<Self, ClusterError> {
        let name = object.metadata.name.clone().ok_or_else(|| {
            ClusterError::InvalidRequest(format!("{} object has no metadata.name", kind))
        })?;
        Ok(Self {
            kind,
            namespace: object.metadata.namespace.clone(),
            name,
        })
    }

    /// Field selector restricting a watch to this object's name.
    pub fn field_selector(&self) -> String {
        format!("metadata.name={}", self.name)
    }

    /// Whether an object snapshot is the one this selector names.
    pub fn matches(&self, object: &DynamicObject) -> bool {
        object.metadata.name.as_deref() == Some(self.name.as_str())
            && (self.namespace.is_none() || object.metadata.namespace == self.namespace)
    }
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

//! Mock ClusterApi for unit testing
//!
//! This module provides an in-memory implementation of `ClusterApi` that can be
//! used in unit tests without requiring a running cluster. Mutations made through
//! the trait or through the test helpers are broadcast as change events to every
//! open subscription whose selector matches the object.

use crate::cluster_trait::ClusterApi;
use crate::error::ClusterError;
use crate::event::{ChangeEvent, object_key};
use crate::selector::{ResourceKind, ResourceSelector};
use crate::subscription::Subscription;
use futures::StreamExt;
use kube::api::DynamicObject;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Subscriber = (ResourceSelector, mpsc::UnboundedSender<Result<ChangeEvent, ClusterError>>);

/// Mock cluster for testing
///
/// Objects are stored per kind under their `namespace/name` key.
#[derive(Clone, Default)]
pub struct MockClusterApi {
    objects: Arc<Mutex<HashMap<(ResourceKind, String), DynamicObject>>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    denied_kinds: Arc<Mutex<HashSet<ResourceKind>>>,
    scale_requests: Arc<Mutex<Vec<(ResourceSelector, i32)>>>,
    delete_requests: Arc<Mutex<Vec<ResourceSelector>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockClusterApi {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object without emitting an event (it "already existed")
    pub fn insert(&self, kind: ResourceKind, object: DynamicObject) {
        lock(&self.objects).insert((kind, object_key(&object)), object);
    }

    /// Store an object and emit Added (new) or Modified (existing)
    pub fn apply(&self, kind: ResourceKind, object: DynamicObject) {
        let previous = lock(&self.objects).insert((kind, object_key(&object)), object.clone());
        let event = if previous.is_some() {
            ChangeEvent::modified(object)
        } else {
            ChangeEvent::added(object)
        };
        self.broadcast(kind, event);
    }

    /// Set a deletion timestamp on a stored object and emit Modified
    pub fn mark_terminating(&self, selector: &ResourceSelector) -> bool {
        let updated = {
            let mut objects = lock(&self.objects);
            let Some(object) = objects.get_mut(&(selector.kind, Self::key(selector))) else {
                return false;
            };
            object.metadata.deletion_timestamp =
                serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).ok();
            object.clone()
        };
        self.broadcast(selector.kind, ChangeEvent::modified(updated));
        true
    }

    /// Remove a stored object and emit Deleted
    pub fn remove(&self, selector: &ResourceSelector) -> bool {
        let removed = lock(&self.objects).remove(&(selector.kind, Self::key(selector)));
        match removed {
            Some(object) => {
                self.broadcast(selector.kind, ChangeEvent::deleted(object));
                true
            }
            None => false,
        }
    }

    /// Deliver a raw event to matching subscribers without touching the store
    pub fn emit(&self, kind: ResourceKind, event: ChangeEvent) {
        self.broadcast(kind, event);
    }

    /// Make every future `subscribe` for this kind fail
    pub fn deny_subscriptions(&self, kind: ResourceKind) {
        lock(&self.denied_kinds).insert(kind);
    }

    /// Fetch a stored object (for test assertions)
    pub fn object(&self, selector: &ResourceSelector) -> Option<DynamicObject> {
        lock(&self.objects).get(&(selector.kind, Self::key(selector))).cloned()
    }

    /// Number of subscriptions on this selector that have not been stopped
    pub fn open_subscriptions(&self, selector: &ResourceSelector) -> usize {
        lock(&self.subscribers)
            .iter()
            .filter(|(s, tx)| s == selector && !tx.is_closed())
            .count()
    }

    /// Number of subscriptions ever opened on this selector
    pub fn total_subscriptions(&self, selector: &ResourceSelector) -> usize {
        lock(&self.subscribers).iter().filter(|(s, _)| s == selector).count()
    }

    /// Scale calls received so far
    pub fn scale_requests(&self) -> Vec<(ResourceSelector, i32)> {
        lock(&self.scale_requests).clone()
    }

    /// Delete calls received so far
    pub fn delete_requests(&self) -> Vec<ResourceSelector> {
        lock(&self.delete_requests).clone()
    }

    fn key(selector: &ResourceSelector) -> String {
        match (&selector.namespace, selector.kind.is_namespaced()) {
            (Some(ns), true) => format!("{}/{}", ns, selector.name),
            _ => selector.name.clone(),
        }
    }

    fn broadcast(&self, kind: ResourceKind, event: ChangeEvent) {
        let subscribers = lock(&self.subscribers);
        for (selector, tx) in subscribers.iter() {
            if selector.kind == kind && selector.matches(&event.snapshot) {
                let _ = tx.send(Ok(event.clone()));
            }
        }
    }

    fn labels_match(object: &DynamicObject, label_selector: &str) -> bool {
        let empty = BTreeMap::new();
        let labels = object.metadata.labels.as_ref().unwrap_or(&empty);
        label_selector
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .all(|term| match term.split_once('=') {
                Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
                None => labels.contains_key(term),
            })
    }
}

impl std::fmt::Debug for MockClusterApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterApi")
            .field("objects", &lock(&self.objects).len())
            .field("subscribers", &lock(&self.subscribers).len())
            .finish()
    }
}

#[async_trait::async_trait]
impl ClusterApi for MockClusterApi {
    async fn get(&self, selector: &ResourceSelector) -> Result<DynamicObject, ClusterError> {
        self.object(selector)
            .ok_or_else(|| ClusterError::NotFound(selector.to_string()))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let objects = lock(&self.objects);
        let mut items: Vec<DynamicObject> = objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, object)| object)
            .filter(|object| namespace.is_none() || object.metadata.namespace.as_deref() == namespace)
            .filter(|object| Self::labels_match(object, label_selector))
            .cloned()
            .collect();
        items.sort_by_key(object_key);
        Ok(items)
    }

    async fn create(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject, ClusterError> {
        let selector = ResourceSelector::for_object(kind, object)?;
        if self.object(&selector).is_some() {
            return Err(ClusterError::AlreadyExists(selector.to_string()));
        }
        self.apply(kind, object.clone());
        Ok(object.clone())
    }

    async fn delete(&self, selector: &ResourceSelector) -> Result<(), ClusterError> {
        lock(&self.delete_requests).push(selector.clone());
        if self.remove(selector) {
            Ok(())
        } else {
            Err(ClusterError::NotFound(selector.to_string()))
        }
    }

    async fn scale(&self, selector: &ResourceSelector, replicas: i32) -> Result<(), ClusterError> {
        if !selector.kind.is_scalable() {
            return Err(ClusterError::InvalidRequest(format!("{} cannot be scaled", selector.kind)));
        }
        let mut object = self
            .object(selector)
            .ok_or_else(|| ClusterError::NotFound(selector.to_string()))?;
        lock(&self.scale_requests).push((selector.clone(), replicas));
        object.data["spec"]["replicas"] = serde_json::json!(replicas);
        self.apply(selector.kind, object);
        Ok(())
    }

    async fn subscribe(&self, selector: &ResourceSelector) -> Result<Subscription, ClusterError> {
        if lock(&self.denied_kinds).contains(&selector.kind) {
            return Err(ClusterError::Subscription(format!("{}: forbidden", selector)));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push((selector.clone(), tx));
        Ok(Subscription::new(selector.clone(), UnboundedReceiverStream::new(rx).boxed()))
    }
}

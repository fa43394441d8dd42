//! Change events
//!
//! A `ChangeEvent` is one notification from a subscription: the object was
//! added, modified or deleted, together with the snapshot delivered with it.
//! Events are ordered per object only.

use crate::error::ClusterError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{DynamicObject, WatchEvent};

/// What happened to the watched object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEventType {
    Added,
    Modified,
    Deleted,
}

/// One notification from a change stream.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub event_type: ChangeEventType,
    pub snapshot: DynamicObject,
}

impl ChangeEvent {
    pub fn added(snapshot: DynamicObject) -> Self {
        Self { event_type: ChangeEventType::Added, snapshot }
    }

    pub fn modified(snapshot: DynamicObject) -> Self {
        Self { event_type: ChangeEventType::Modified, snapshot }
    }

    pub fn deleted(snapshot: DynamicObject) -> Self {
        Self { event_type: ChangeEventType::Deleted, snapshot }
    }

    /// Deletion timestamp carried by the snapshot, if the object is terminating.
    pub fn deletion_timestamp(&self) -> Option<&Time> {
        self.snapshot.metadata.deletion_timestamp.as_ref()
    }

    /// Whether the snapshot marks the object as being deleted.
    pub fn is_terminating(&self) -> bool {
        self.deletion_timestamp().is_some()
    }

    /// Cache key of the object this event is about.
    pub fn key(&self) -> String {
        object_key(&self.snapshot)
    }

    /// Convert a raw watch event. Bookmarks carry no object and yield `None`.
    pub fn from_watch_event(event: WatchEvent<DynamicObject>) -> Option<Result<Self, ClusterError>> {
        match event {
            WatchEvent::Added(obj) => Some(Ok(Self::added(obj))),
            WatchEvent::Modified(obj) => Some(Ok(Self::modified(obj))),
            WatchEvent::Deleted(obj) => Some(Ok(Self::deleted(obj))),
            WatchEvent::Bookmark(_) => None,
            WatchEvent::Error(err) => Some(Err(ClusterError::Watch(format!("{:?}", err)))),
        }
    }
}

/// `namespace/name` for namespaced objects, `name` otherwise.
pub fn object_key(object: &DynamicObject) -> String {
    let name = object.metadata.name.as_deref().unwrap_or("<unknown>");
    match object.metadata.namespace.as_deref() {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    }
}

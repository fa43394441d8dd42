//! Continuous state sync over one subscription
//!
//! `StateSyncer` dispatches every change event to a `SyncHandler` and keeps a
//! local cache of the last-known snapshot per object, until the caller cancels
//! or the stream ends.

use crate::error::{HandlerError, SyncError};
use cluster_client::{ChangeEvent, ChangeEventType, DynamicObject, Subscription, object_key};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callbacks invoked by `StateSyncer`.
///
/// Errors are logged by the syncer and never stop the loop.
#[async_trait::async_trait]
pub trait SyncHandler: Send + Sync {
    async fn on_add(&self, object: &DynamicObject) -> Result<(), HandlerError>;

    /// `old` is the cached snapshot, if the object was seen before.
    async fn on_update(&self, old: Option<&DynamicObject>, new: &DynamicObject) -> Result<(), HandlerError>;

    async fn on_delete(&self, object: &DynamicObject) -> Result<(), HandlerError>;
}

/// Why a sync session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncExit {
    Cancelled,
    StreamEnded,
}

/// Long-running event dispatcher with a private cache.
#[derive(Debug, Default)]
pub struct StateSyncer {
    cache: HashMap<String, DynamicObject>,
}

impl StateSyncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-known snapshots keyed by `namespace/name`.
    pub fn cache(&self) -> &HashMap<String, DynamicObject> {
        &self.cache
    }

    /// Dispatch events from `subscription` until `cancel` fires or the stream ends.
    ///
    /// Cancellation is checked between deliveries only; a handler call that has
    /// started always runs to completion. The subscription is stopped on every
    /// exit path.
    pub async fn run(
        &mut self,
        mut subscription: Subscription,
        handler: &dyn SyncHandler,
        cancel: &CancellationToken,
    ) -> Result<SyncExit, SyncError> {
        let selector = subscription.selector().to_string();
        info!("Starting state sync for {}", selector);

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(SyncExit::Cancelled),
                next = subscription.next_event() => next,
            };

            match next {
                Some(Ok(event)) => self.dispatch(event, handler).await,
                Some(Err(e)) => {
                    break Err(SyncError::Stream {
                        selector: selector.clone(),
                        reason: e.to_string(),
                    });
                }
                None => break Ok(SyncExit::StreamEnded),
            }
        };

        subscription.stop();
        match &exit {
            Ok(reason) => info!("State sync for {} stopped: {:?}", selector, reason),
            Err(e) => warn!("State sync for {} failed: {}", selector, e),
        }
        exit
    }

    /// Apply one event to the handler and the cache.
    pub async fn dispatch(&mut self, event: ChangeEvent, handler: &dyn SyncHandler) {
        let key = object_key(&event.snapshot);
        let result = match event.event_type {
            ChangeEventType::Added => {
                let result = handler.on_add(&event.snapshot).await;
                self.cache.insert(key.clone(), event.snapshot);
                result
            }
            ChangeEventType::Modified if event.is_terminating() => {
                debug!("Ignoring update to terminating object {}", key);
                Ok(())
            }
            ChangeEventType::Modified => {
                let result = handler.on_update(self.cache.get(&key), &event.snapshot).await;
                self.cache.insert(key.clone(), event.snapshot);
                result
            }
            ChangeEventType::Deleted => {
                let result = handler.on_delete(&event.snapshot).await;
                self.cache.remove(&key);
                result
            }
        };

        if let Err(e) = result {
            warn!("Sync handler failed for {}: {}", key, e);
        }
    }
}

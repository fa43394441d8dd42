//! Change subscriptions
//!
//! A `Subscription` owns one live change stream for one object. The owner is
//! responsible for calling `stop()` on every exit path; stopping is idempotent
//! and dropping an unstopped subscription stops it as well.

use crate::error::ClusterError;
use crate::event::ChangeEvent;
use crate::selector::ResourceSelector;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::fmt;
use tokio::task::AbortHandle;
use tracing::debug;

/// Stream of change events (or stream errors) for one object.
pub type EventStream = BoxStream<'static, Result<ChangeEvent, ClusterError>>;

/// A live, name-filtered change stream.
pub struct Subscription {
    selector: ResourceSelector,
    stream: Option<EventStream>,
    /// Background task feeding the stream, aborted on stop
    feeder: Option<AbortHandle>,
}

impl Subscription {
    /// Wrap an already-established event stream.
    pub fn new(selector: ResourceSelector, stream: EventStream) -> Self {
        Self {
            selector,
            stream: Some(stream),
            feeder: None,
        }
    }

    /// Attach the task that produces this stream so `stop()` can abort it.
    pub fn with_feeder(mut self, feeder: AbortHandle) -> Self {
        self.feeder = Some(feeder);
        self
    }

    /// The object this subscription watches.
    pub fn selector(&self) -> &ResourceSelector {
        &self.selector
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the stream has ended or the subscription was stopped.
    /// Cancel-safe: dropping the returned future loses no event.
    pub async fn next_event(&mut self) -> Option<Result<ChangeEvent, ClusterError>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    /// Release the stream and its feeder task. Later calls are no-ops.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            if let Some(feeder) = self.feeder.take() {
                feeder.abort();
            }
            debug!("Stopped subscription for {}", self.selector);
        }
    }

    /// Whether `stop()` has already run.
    pub fn is_stopped(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("selector", &self.selector)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

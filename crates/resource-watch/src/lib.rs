//! Resource Watch Core
//!
//! Subscribes to change streams of externally managed Kubernetes resources,
//! detects state transitions and coordinates multi-resource workflows under
//! timeouts and cancellation.
//!
//! - `watcher`: wait on one subscription for a desired state or deletion
//! - `multiplex`: run several waits concurrently and join them into one result
//! - `syncer`: continuous add/update/delete dispatch over one subscription
//! - `config` / `config_syncer`: durable, cached driver configuration kept in
//!   step with the storage backend Service address
//! - `workflow`: ordered mutate-then-wait step sequences (teardown, sanity check,
//!   provisioning wait)

pub mod checks;
pub mod config;
pub mod config_syncer;
pub mod error;
pub mod multiplex;
pub mod subscribe;
pub mod syncer;
pub mod watcher;
pub mod workflow;

pub use checks::DesiredState;
pub use config::{ConfigCache, ConfigStore, FileConfigStore, FlexConfig};
pub use config_syncer::{ConfigSyncer, ServiceAddressMirror};
pub use error::{ConfigError, HandlerError, StepError, SyncError, WaitError, WorkflowError};
pub use multiplex::watch_all;
pub use subscribe::{subscribe_all, subscribe_named};
pub use syncer::{StateSyncer, SyncExit, SyncHandler};
pub use watcher::{Completion, DEFAULT_WATCH_TIMEOUT, WatchOutcome, WatchRequest, watch};
pub use workflow::{Action, Step, Wait, WaitTarget, Workflow};

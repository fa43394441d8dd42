//! Error types for the watch core.
//!
//! Waits fail with `WaitError`, the continuous syncer with `SyncError`,
//! handler callbacks with `HandlerError` (logged, never fatal), the config
//! store with `ConfigError` and workflows with `WorkflowError`, which names
//! the step that failed.

use cluster_client::ClusterError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Why a single wait did not complete successfully.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaitError {
    /// No satisfying or deletion event arrived within the budget
    #[error("Timed out after {timeout:?} waiting for {selector}")]
    Timeout { selector: String, timeout: Duration },

    /// The resource is being deleted and cannot reach the desired state
    #[error("{0} is terminating and can no longer reach the desired state")]
    Terminating(String),

    /// The change stream ended before a terminal event
    #[error("Watch stream for {0} closed before a terminal event")]
    StreamClosed(String),

    /// The change stream delivered an error
    #[error("Watch stream for {selector} failed: {reason}")]
    Stream { selector: String, reason: String },

    /// The worker running the wait panicked or was cancelled
    #[error("Watch worker aborted: {0}")]
    WorkerAborted(String),
}

/// Failure inside a sync handler callback.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Handler failed: {0}")]
    Failed(String),
}

/// Errors that end a sync session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Subscribing or fetching the initial state failed
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// The change stream delivered an error
    #[error("Sync stream for {selector} failed: {reason}")]
    Stream { selector: String, reason: String },
}

/// Errors reading or writing the durable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConfigError {
    /// Wrap an I/O failure on `path`.
    pub fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failure of one workflow step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("Invalid step: {0}")]
    InvalidPlan(String),
}

/// Failure of a whole workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A step failed; remaining steps were not run
    #[error("Workflow '{workflow}' failed at step {index} ({step}): {source}")]
    Step {
        workflow: String,
        step: String,
        index: usize,
        #[source]
        source: StepError,
    },

    /// The workflow could not be built from its inputs
    #[error("Invalid workflow: {0}")]
    InvalidPlan(String),
}

impl WorkflowError {
    /// Name of the failed step, if the failure came from a step.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            WorkflowError::Step { step, .. } => Some(step),
            WorkflowError::InvalidPlan(_) => None,
        }
    }
}

//! Controller-specific error types.
//!
//! Wraps the errors of the cluster client and the watch core, plus the
//! controller's own configuration and argument errors.

use cluster_client::ClusterError;
use resource_watch::{ConfigError, WorkflowError};
use thiserror::Error;

/// Errors that can occur in the FlexVol Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Cluster(#[from] ClusterError),

    /// Driver config could not be read or written
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A workflow step failed
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid command-line argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

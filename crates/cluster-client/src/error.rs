//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster resource API
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes client/transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists (create conflict)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Kind is not one the client knows how to address
    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),

    /// Change stream could not be established
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// Change stream delivered an error event
    #[error("Watch stream error: {0}")]
    Watch(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request (e.g., missing object name)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClusterError {
    /// Returns true when the error means the target resource is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// Returns true when a create call hit an existing resource.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists(_))
    }

    /// Classify a kube API error, mapping 404 and 409 onto the dedicated variants.
    pub(crate) fn from_kube(err: kube::Error, what: &str) -> Self {
        if let kube::Error::Api(ref response) = err {
            match response.code {
                404 => return ClusterError::NotFound(what.to_string()),
                409 => return ClusterError::AlreadyExists(what.to_string()),
                _ => {}
            }
        }
        ClusterError::Kube(err)
    }
}

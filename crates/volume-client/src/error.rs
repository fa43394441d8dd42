//! Storage backend client errors

use thiserror::Error;

/// Errors that can occur when interacting with the storage backend API
#[derive(Debug, Error)]
pub enum VolumeError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an error
    #[error("Storage backend error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid or missing token)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Volume not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., empty volume name)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl VolumeError {
    /// Returns true when the error means the volume is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VolumeError::NotFound(_))
    }
}

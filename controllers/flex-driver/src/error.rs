//! Driver error types.
//!
//! Every error is reported to the kubelet as a `Failure` result carrying the
//! error message; none of them changes the process exit code.

use resource_watch::ConfigError;
use thiserror::Error;
use volume_client::VolumeError;

/// Errors that can occur while handling one driver call.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Storage backend error
    #[error("Backend error: {0}")]
    Volume(#[from] VolumeError),

    /// Driver config could not be read
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The config does not say where the backend is
    #[error("Backend address is not configured in {0}")]
    NotConfigured(String),

    /// The JSON options argument is malformed or incomplete
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Local filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// mount/umount failed
    #[error("Mount failed: {0}")]
    Mount(String),
}

//! VolumeClient trait for mocking
//!
//! This trait abstracts the VolumeClient to enable mocking in unit tests.
//! The concrete VolumeClient implements this trait, and tests can use mock implementations.

use crate::error::VolumeError;
use crate::models::*;

/// Trait for storage backend operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait VolumeClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<Volume, VolumeError>;
    async fn remove_volume(&self, name: &str) -> Result<(), VolumeError>;
    async fn attach_volume(&self, name: &str, node: &str) -> Result<Attachment, VolumeError>;
    async fn detach_volume(&self, name: &str, node: &str) -> Result<(), VolumeError>;
    async fn list_volumes(&self) -> Result<Vec<Volume>, VolumeError>;
    async fn get_volume(&self, name: &str) -> Result<Volume, VolumeError>;
}

//! Mock VolumeClient for unit testing
//!
//! This module provides a mock implementation of VolumeClientTrait that can be used
//! in unit tests without requiring a running storage backend.

use crate::error::VolumeError;
use crate::models::*;
use crate::volume_trait::VolumeClientTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock VolumeClient for testing
///
/// This mock stores volumes in memory and hands out device paths in attach order.
#[derive(Clone)]
pub struct MockVolumeClient {
    base_url: String,
    volumes: Arc<Mutex<HashMap<String, Volume>>>,
    // Counter for generating device names
    next_device: Arc<Mutex<u8>>,
    // When set, every call fails with an API error
    unavailable: Arc<Mutex<bool>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockVolumeClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            volumes: Arc::new(Mutex::new(HashMap::new())),
            next_device: Arc::new(Mutex::new(0)),
            unavailable: Arc::new(Mutex::new(false)),
        }
    }

    /// Add a volume to the mock store (for test setup)
    pub fn add_volume(&self, volume: Volume) {
        lock(&self.volumes).insert(volume.name.clone(), volume);
    }

    /// Make every subsequent call fail as if the backend were down
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    /// Fetch a stored volume (for test assertions)
    pub fn volume(&self, name: &str) -> Option<Volume> {
        lock(&self.volumes).get(name).cloned()
    }

    fn ensure_available(&self) -> Result<(), VolumeError> {
        if *lock(&self.unavailable) {
            return Err(VolumeError::Api("backend unavailable: 503 Service Unavailable".to_string()));
        }
        Ok(())
    }

    /// Generate next device path (/dev/vdb, /dev/vdc, ...)
    fn next_device(&self) -> String {
        let mut next = lock(&self.next_device);
        let letter = char::from(b'b' + (*next % 24));
        *next = next.wrapping_add(1);
        format!("/dev/vd{}", letter)
    }
}

impl std::fmt::Debug for MockVolumeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockVolumeClient")
            .field("base_url", &self.base_url)
            .field("volumes", &lock(&self.volumes).len())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl VolumeClientTrait for MockVolumeClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<Volume, VolumeError> {
        self.ensure_available()?;
        if request.name.is_empty() {
            return Err(VolumeError::InvalidRequest("volume name is empty".to_string()));
        }
        let mut volumes = lock(&self.volumes);
        if volumes.contains_key(&request.name) {
            return Err(VolumeError::Api(format!("create volume {}: 409 Conflict - already exists", request.name)));
        }
        let volume = Volume {
            name: request.name.clone(),
            size_gb: request.size_gb,
            fs_type: request.fs_type.clone(),
            attached_node: None,
            device: None,
        };
        volumes.insert(volume.name.clone(), volume.clone());
        Ok(volume)
    }

    async fn remove_volume(&self, name: &str) -> Result<(), VolumeError> {
        self.ensure_available()?;
        lock(&self.volumes)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| VolumeError::NotFound(format!("volume {}", name)))
    }

    async fn attach_volume(&self, name: &str, node: &str) -> Result<Attachment, VolumeError> {
        self.ensure_available()?;
        let device = self.next_device();
        let mut volumes = lock(&self.volumes);
        let volume = volumes
            .get_mut(name)
            .ok_or_else(|| VolumeError::NotFound(format!("volume {}", name)))?;

        match (&volume.attached_node, &volume.device) {
            // Re-attaching to the same node is idempotent
            (Some(current), Some(existing)) if current == node => {
                return Ok(Attachment { device: existing.clone() });
            }
            (Some(current), _) => {
                return Err(VolumeError::Api(format!(
                    "volume {}: 409 Conflict - attached to {}",
                    name, current
                )));
            }
            _ => {}
        }

        volume.attached_node = Some(node.to_string());
        volume.device = Some(device.clone());
        Ok(Attachment { device })
    }

    async fn detach_volume(&self, name: &str, node: &str) -> Result<(), VolumeError> {
        self.ensure_available()?;
        let mut volumes = lock(&self.volumes);
        let volume = volumes
            .get_mut(name)
            .ok_or_else(|| VolumeError::NotFound(format!("volume {}", name)))?;
        if volume.attached_node.as_deref() == Some(node) {
            volume.attached_node = None;
            volume.device = None;
        }
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, VolumeError> {
        self.ensure_available()?;
        let mut volumes: Vec<Volume> = lock(&self.volumes).values().cloned().collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(volumes)
    }

    async fn get_volume(&self, name: &str) -> Result<Volume, VolumeError> {
        self.ensure_available()?;
        self.volume(name)
            .ok_or_else(|| VolumeError::NotFound(format!("volume {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> CreateVolumeRequest {
        CreateVolumeRequest {
            name: name.to_string(),
            size_gb: 5,
            fs_type: None,
        }
    }

    #[tokio::test]
    async fn test_attach_is_idempotent_per_node() {
        let mock = MockVolumeClient::new("http://test-backend");
        mock.create_volume(&request("vol-a")).await.unwrap();

        let first = mock.attach_volume("vol-a", "node-1").await.unwrap();
        let again = mock.attach_volume("vol-a", "node-1").await.unwrap();
        assert_eq!(first, again);

        let err = mock.attach_volume("vol-a", "node-2").await.unwrap_err();
        assert!(matches!(err, VolumeError::Api(_)));
    }

    #[tokio::test]
    async fn test_detach_then_remove() {
        let mock = MockVolumeClient::new("http://test-backend");
        mock.create_volume(&request("vol-a")).await.unwrap();
        mock.attach_volume("vol-a", "node-1").await.unwrap();
        mock.detach_volume("vol-a", "node-1").await.unwrap();
        assert!(mock.volume("vol-a").unwrap().attached_node.is_none());

        mock.remove_volume("vol-a").await.unwrap();
        assert!(mock.get_volume("vol-a").await.unwrap_err().is_not_found());
    }
}

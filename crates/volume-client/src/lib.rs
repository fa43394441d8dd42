//! Storage Backend REST Client
//!
//! A Rust client for the remote storage backend that owns the volumes the
//! FlexVol driver attaches and mounts. Volumes are addressed by name.
//!
//! # Example
//!
//! ```no_run
//! use volume_client::{VolumeClient, VolumeClientTrait, CreateVolumeRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = VolumeClient::new("http://10.0.0.12:9500".to_string(), None)?;
//!
//! let volume = client.create_volume(&CreateVolumeRequest {
//!     name: "pvc-3f1c".to_string(),
//!     size_gb: 10,
//!     fs_type: Some("ext4".to_string()),
//! }).await?;
//!
//! let attachment = client.attach_volume(&volume.name, "worker-1").await?;
//! println!("attached at {}", attachment.device);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod volume_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::VolumeClient;
pub use error::VolumeError;
pub use models::*;
pub use volume_trait::VolumeClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockVolumeClient;

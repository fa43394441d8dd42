//! Cluster API Client
//!
//! Access to externally managed Kubernetes resources for the FlexVol components.
//! Resources are addressed by kind, namespace and name and handled as
//! `DynamicObject` snapshots, so one client covers every kind the driver and
//! controller care about.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterApi, KubeClusterApi, ResourceKind, ResourceSelector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = KubeClusterApi::try_default().await?;
//! let selector = ResourceSelector::namespaced(ResourceKind::Service, "flexvol-system", "flexvol-backend");
//!
//! // Open a change stream for exactly this object
//! let mut subscription = api.subscribe(&selector).await?;
//! while let Some(event) = subscription.next_event().await {
//!     println!("{:?}", event?.event_type);
//! }
//! subscription.stop();
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **CRUD**: get, list (by label selector), create, delete, scale
//! - **Subscriptions**: name-filtered change streams, opened synchronously
//! - **Mocking**: in-memory `MockClusterApi` behind the `test-util` feature

pub mod client;
pub mod error;
pub mod event;
pub mod selector;
pub mod subscription;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterApi;
pub use cluster_trait::ClusterApi;
pub use error::ClusterError;
pub use event::{ChangeEvent, ChangeEventType, object_key};
pub use kube::api::DynamicObject;
pub use selector::{ResourceKind, ResourceSelector};
pub use subscription::{EventStream, Subscription};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockClusterApi;

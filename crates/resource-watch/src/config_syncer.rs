//! Mirror the storage backend Service address into the driver config
//!
//! The backend is reached through a Service whose cluster IP can change when
//! the Service is recreated. `ConfigSyncer` watches that one Service and keeps
//! `serverAddress` in the durable config equal to its `spec.clusterIP`.

use crate::checks::service_cluster_ip;
use crate::config::ConfigCache;
use crate::error::{HandlerError, SyncError};
use crate::syncer::{StateSyncer, SyncExit, SyncHandler};
use cluster_client::{ChangeEvent, ClusterApi, DynamicObject, ResourceSelector, object_key};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// `SyncHandler` that copies a Service's cluster IP into the config.
#[derive(Debug, Clone)]
pub struct ServiceAddressMirror {
    config: Arc<ConfigCache>,
}

impl ServiceAddressMirror {
    pub fn new(config: Arc<ConfigCache>) -> Self {
        Self { config }
    }

    /// Update the config if `service` carries an address different from the
    /// cached one. Returns whether an update was written.
    pub async fn mirror(&self, service: &DynamicObject) -> Result<bool, HandlerError> {
        let Some(address) = service_cluster_ip(service) else {
            debug!("Service {} has no cluster IP yet", object_key(service));
            return Ok(false);
        };

        let mut config = self.config.current_config().await?;
        if config.server_address == address {
            return Ok(false);
        }

        info!(
            "Backend address changed from '{}' to '{}'",
            config.server_address, address
        );
        config.server_address = address.to_string();
        self.config.update_config(config).await?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl SyncHandler for ServiceAddressMirror {
    async fn on_add(&self, object: &DynamicObject) -> Result<(), HandlerError> {
        self.mirror(object).await.map(|_| ())
    }

    async fn on_update(&self, _old: Option<&DynamicObject>, new: &DynamicObject) -> Result<(), HandlerError> {
        self.mirror(new).await.map(|_| ())
    }

    async fn on_delete(&self, object: &DynamicObject) -> Result<(), HandlerError> {
        warn!("Backend service {} was deleted", object_key(object));
        Ok(())
    }
}

/// Keeps the config in step with the backend Service for one sync session.
pub struct ConfigSyncer {
    api: Arc<dyn ClusterApi>,
    service: ResourceSelector,
    mirror: ServiceAddressMirror,
}

impl ConfigSyncer {
    pub fn new(api: Arc<dyn ClusterApi>, service: ResourceSelector, config: Arc<ConfigCache>) -> Self {
        Self {
            api,
            service,
            mirror: ServiceAddressMirror::new(config),
        }
    }

    pub fn service(&self) -> &ResourceSelector {
        &self.service
    }

    /// Run one sync session until `cancel` fires or the stream ends.
    ///
    /// The subscription is opened before the current state is read, so a
    /// change between the two is never missed.
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<SyncExit, SyncError> {
        let mut subscription = self.api.subscribe(&self.service).await?;
        let mut syncer = StateSyncer::new();

        match self.api.get(&self.service).await {
            Ok(service) => syncer.dispatch(ChangeEvent::added(service), &self.mirror).await,
            Err(e) if e.is_not_found() => {
                info!("Backend service {} does not exist yet", self.service);
            }
            Err(e) => {
                subscription.stop();
                return Err(e.into());
            }
        }

        syncer.run(subscription, &self.mirror, cancel).await
    }
}

impl std::fmt::Debug for ConfigSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSyncer")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

//! Main controller implementation.
//!
//! The `Controller` keeps the driver config's `serverAddress` equal to the
//! backend Service's cluster IP. Each sync session subscribes to the Service,
//! processes its current state and then follows its changes. Sessions end
//! whenever the watch does (the API server closes watches periodically) and
//! are restarted with Fibonacci backoff until shutdown.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::settings::Settings;
use cluster_client::ClusterApi;
use resource_watch::{ConfigCache, ConfigSyncer, SyncExit};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A session that lasted at least this long resets the backoff.
const HEALTHY_SESSION: Duration = Duration::from_secs(60);
const MIN_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;

/// Config sync loop for the storage backend Service.
pub struct Controller {
    syncer: ConfigSyncer,
    config: Arc<ConfigCache>,
    backend_port: u16,
    backoff: FibonacciBackoff,
}

impl Controller {
    /// Creates a new controller instance.
    pub fn new(api: Arc<dyn ClusterApi>, config: Arc<ConfigCache>, settings: &Settings) -> Self {
        info!("Initializing FlexVol Controller for {}", settings.backend_service());
        Self {
            syncer: ConfigSyncer::new(api, settings.backend_service(), Arc::clone(&config)),
            config,
            backend_port: settings.backend_port,
            backoff: FibonacciBackoff::new(MIN_BACKOFF_SECS, MAX_BACKOFF_SECS),
        }
    }

    /// Record the backend port in the config if it does not carry one yet.
    async fn ensure_backend_port(&self) -> Result<(), ControllerError> {
        let mut config = self.config.current_config().await?;
        if config.server_port.is_none() {
            info!("Recording backend port {} in config", self.backend_port);
            config.server_port = Some(self.backend_port);
            self.config.update_config(config).await?;
        }
        Ok(())
    }

    /// Runs sync sessions until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ControllerError> {
        self.ensure_backend_port().await?;

        loop {
            let started = Instant::now();
            match self.syncer.sync(&cancel).await {
                Ok(SyncExit::Cancelled) => break,
                Ok(SyncExit::StreamEnded) => debug!("Sync session for {} ended", self.syncer.service()),
                Err(e) => warn!("Sync session for {} failed: {}", self.syncer.service(), e),
            }
            if cancel.is_cancelled() {
                break;
            }

            if started.elapsed() >= HEALTHY_SESSION {
                self.backoff.reset();
            }
            let delay = self.backoff.next_backoff();
            debug!("Restarting sync session in {:?}", delay);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("FlexVol Controller stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("syncer", &self.syncer)
            .field("backend_port", &self.backend_port)
            .finish_non_exhaustive()
    }
}

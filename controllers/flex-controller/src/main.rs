//! FlexVol Controller
//!
//! Long-running companion of the FlexVol driver:
//! - `sync` (default): mirrors the backend Service cluster IP into the driver config
//! - `teardown`: scales a workload to zero, deletes it and its extra resources
//! - `sanity-check`: runs a probe pod that mounts a volume through the driver
//! - `wait-ready`: waits until a set of resources is ready

mod backoff;
mod commands;
mod controller;
mod error;
mod settings;

use clap::{Parser, Subcommand};
use cluster_client::{ClusterApi, KubeClusterApi};
use controller::Controller;
use crate::error::ControllerError;
use resource_watch::ConfigCache;
use settings::Settings;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep the driver config in step with the backend Service (default)
    Sync,
    /// Scale a workload to zero and delete it, then delete extra resources
    Teardown {
        /// Workload as kind/name (deployment, statefulset or replicaset)
        workload: String,
        /// Further resources to delete afterwards, as kind/name
        #[arg(long = "extra")]
        extra: Vec<String>,
    },
    /// Start a probe pod that mounts a volume through the driver
    SanityCheck {
        /// Volume to mount
        #[arg(long)]
        volume: String,
        /// Probe pod name (generated if omitted)
        #[arg(long)]
        pod: Option<String>,
    },
    /// Wait until every target is ready
    WaitReady {
        /// Targets as kind/name
        #[arg(required = true)]
        targets: Vec<String>,
        /// Overall budget per target, in seconds
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Pin the ring provider before the kube client builds its TLS config
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    info!("Starting FlexVol Controller");
    info!("Configuration:");
    info!("  Namespace: {}", settings.namespace);
    info!("  Backend service: {}", settings.service_name);
    info!("  Config path: {}", settings.config_path.display());

    let api: Arc<dyn ClusterApi> = Arc::new(KubeClusterApi::try_default().await?);

    match cli.command.unwrap_or(Command::Sync) {
        Command::Sync => {
            let config = Arc::new(ConfigCache::from_path(&settings.config_path));
            let cancel = CancellationToken::new();
            spawn_shutdown_signal(cancel.clone());
            Controller::new(api, config, &settings).run(cancel).await
        }
        Command::Teardown { workload, extra } => {
            commands::run_teardown(api.as_ref(), &settings.namespace, &workload, &extra).await
        }
        Command::SanityCheck { volume, pod } => {
            commands::run_sanity_check(api.as_ref(), &settings.namespace, pod.as_deref(), &volume).await
        }
        Command::WaitReady { targets, timeout_secs } => {
            commands::run_wait_ready(api.as_ref(), &settings.namespace, &targets, Duration::from_secs(timeout_secs))
                .await
        }
    }
}

/// Cancel `cancel` on Ctrl+C or SIGTERM.
fn spawn_shutdown_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, initiating shutdown"),
                Err(e) => {
                    error!("Failed to install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating shutdown");
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        cancel.cancel();
    });
}

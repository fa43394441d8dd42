//! FlexVol FlexVolume Driver
//!
//! Invoked by the kubelet once per volume operation. Reads the driver config
//! written by the controller, forwards attach-side calls to the storage
//! backend, performs mount-side calls locally and prints one JSON result.
//! Logs go to stderr; the exit code is always 0.

mod driver;
mod error;
mod mounter;
mod options;
mod result;

use anyhow::Context;
use clap::{Parser, Subcommand};
use driver::Driver;
use error::DriverError;
use mounter::SystemMounter;
use options::VolumeOptions;
use resource_watch::ConfigCache;
use result::DriverResult;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;
use volume_client::{VolumeClient, VolumeClientTrait};

const DEFAULT_CONFIG_PATH: &str = "/etc/flexvol/config.json";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    operation: Operation,
}

#[derive(Subcommand, Debug)]
enum Operation {
    /// Report driver capabilities
    Init,
    /// Attach a volume to a node
    Attach { options: String, node: String },
    /// Detach a volume from a node
    Detach { volume: String, node: String },
    /// Report the device an attached volume appears at
    #[command(name = "waitforattach")]
    WaitForAttach { device: String, options: String },
    /// Whether a volume is attached to a node
    #[command(name = "isattached")]
    IsAttached { options: String, node: String },
    /// Mount an attached device at the global mount point
    #[command(name = "mountdevice")]
    MountDevice {
        mount_dir: PathBuf,
        device: String,
        options: String,
    },
    /// Unmount the global mount point
    #[command(name = "unmountdevice")]
    UnmountDevice { mount_dir: PathBuf },
    /// Make the volume available in a pod's directory
    Mount { mount_dir: PathBuf, options: String },
    /// Remove the volume from a pod's directory
    Unmount { mount_dir: PathBuf },
    /// Unique name of the volume described by the options
    #[command(name = "getvolumename")]
    GetVolumeName { options: String },
    #[command(external_subcommand)]
    Other(Vec<String>),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Pin the ring provider before the backend client builds its TLS config
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    let result = match Cli::try_parse() {
        Ok(cli) => execute(cli.operation).await,
        Err(e) => DriverResult::failure(e.to_string().trim().to_string()),
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", result.to_json()).context("Failed to write driver result")?;
    Ok(())
}

async fn execute(operation: Operation) -> DriverResult {
    debug!("Driver call: {:?}", operation);
    match &operation {
        Operation::Init => return Driver::init(),
        Operation::Other(args) => {
            let name = args.first().map_or("", String::as_str);
            return DriverResult::not_supported(format!("Operation '{}' is not supported", name));
        }
        _ => {}
    }

    let outcome = match load_driver().await {
        Ok(driver) => dispatch(&driver, operation).await,
        Err(e) => Err(e),
    };
    outcome.unwrap_or_else(|e| {
        error!("Driver call failed: {}", e);
        DriverResult::failure(e.to_string())
    })
}

async fn dispatch(driver: &Driver, operation: Operation) -> Result<DriverResult, DriverError> {
    match operation {
        Operation::Init => Ok(Driver::init()),
        Operation::Attach { options, node } => driver.attach(&VolumeOptions::parse(&options)?, &node).await,
        Operation::Detach { volume, node } => driver.detach(&volume, &node).await,
        Operation::WaitForAttach { device, options } => {
            driver.wait_for_attach(&device, &VolumeOptions::parse(&options)?).await
        }
        Operation::IsAttached { options, node } => driver.is_attached(&VolumeOptions::parse(&options)?, &node).await,
        Operation::MountDevice {
            mount_dir,
            device,
            options,
        } => {
            driver
                .mount_device(&mount_dir, &device, &VolumeOptions::parse(&options)?)
                .await
        }
        Operation::UnmountDevice { mount_dir } => driver.unmount_device(&mount_dir).await,
        Operation::Mount { mount_dir, options } => driver.mount(&mount_dir, &VolumeOptions::parse(&options)?).await,
        Operation::Unmount { mount_dir } => driver.unmount(&mount_dir).await,
        Operation::GetVolumeName { options } => driver.volume_name(&VolumeOptions::parse(&options)?),
        Operation::Other(args) => Ok(DriverResult::not_supported(args.join(" "))),
    }
}

/// Build the driver from `FLEX_CONFIG_PATH` and `FLEX_BACKEND_TOKEN`.
async fn load_driver() -> Result<Driver, DriverError> {
    let path = std::env::var("FLEX_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = ConfigCache::from_path(&path).current_config().await?;

    let backend = match config.backend_url() {
        Some(url) => {
            let token = std::env::var("FLEX_BACKEND_TOKEN").ok().filter(|t| !t.is_empty());
            let client: Box<dyn VolumeClientTrait> = Box::new(VolumeClient::new(url, token)?);
            Some(client)
        }
        None => {
            debug!("No backend address in {}", path);
            None
        }
    };

    Ok(Driver::new(config, backend, Box::new(SystemMounter)))
}

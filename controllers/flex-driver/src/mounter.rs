//! Block device mounting.

use crate::error::DriverError;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Mounts and unmounts block devices.
#[async_trait::async_trait]
pub trait Mounter: Send + Sync {
    async fn mount(&self, device: &str, target: &Path, fs_type: &str, read_only: bool) -> Result<(), DriverError>;

    async fn unmount(&self, target: &Path) -> Result<(), DriverError>;
}

/// `Mounter` backed by the host's `mount` and `umount` commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMounter;

async fn run(program: &str, args: &[&str]) -> Result<(), DriverError> {
    debug!("Running {} {}", program, args.join(" "));
    let output = Command::new(program).args(args).output().await?;
    if output.status.success() {
        return Ok(());
    }
    Err(DriverError::Mount(format!(
        "{} exited with {}: {}",
        program,
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

#[async_trait::async_trait]
impl Mounter for SystemMounter {
    async fn mount(&self, device: &str, target: &Path, fs_type: &str, read_only: bool) -> Result<(), DriverError> {
        let target = target.to_string_lossy();
        let mode = if read_only { "ro" } else { "rw" };
        run("mount", &["-t", fs_type, "-o", mode, device, &target]).await
    }

    async fn unmount(&self, target: &Path) -> Result<(), DriverError> {
        run("umount", &[&target.to_string_lossy()]).await
    }
}

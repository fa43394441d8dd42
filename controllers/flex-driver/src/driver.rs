//! FlexVolume call handling.
//!
//! Attach-side calls (`attach`, `detach`, `isattached`, `waitforattach`) go to
//! the storage backend. Mount-side calls work on the local filesystem: block
//! devices are mounted with `mount`, and `mount`/`unmount` link a pod's volume
//! directory to the volume's directory under the configured mount root.

use crate::error::DriverError;
use crate::mounter::Mounter;
use crate::options::VolumeOptions;
use crate::result::{Capabilities, DriverResult};
use resource_watch::FlexConfig;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use volume_client::{CreateVolumeRequest, VolumeClientTrait};

/// One driver invocation's collaborators.
pub struct Driver {
    config: FlexConfig,
    /// Absent when the config has no backend address yet
    backend: Option<Box<dyn VolumeClientTrait>>,
    mounter: Box<dyn Mounter>,
}

impl Driver {
    pub fn new(config: FlexConfig, backend: Option<Box<dyn VolumeClientTrait>>, mounter: Box<dyn Mounter>) -> Self {
        Self {
            config,
            backend,
            mounter,
        }
    }

    fn backend(&self) -> Result<&dyn VolumeClientTrait, DriverError> {
        self.backend
            .as_deref()
            .ok_or_else(|| DriverError::NotConfigured("serverAddress".to_string()))
    }

    /// Capabilities reported to the kubelet; needs no config.
    pub fn init() -> DriverResult {
        DriverResult::success().capabilities(Capabilities { attach: true })
    }

    /// Attach the volume to `node`, creating it on the backend first if needed.
    pub async fn attach(&self, options: &VolumeOptions, node: &str) -> Result<DriverResult, DriverError> {
        let name = options.volume_name()?;
        let backend = self.backend()?;

        match backend.get_volume(name).await {
            Ok(volume) if volume.is_attached_to(node) => {
                if let Some(device) = volume.device {
                    debug!("{} already attached to {} at {}", name, node, device);
                    return Ok(DriverResult::success().device(device).volume_name(name));
                }
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                info!("Creating volume {} on first attach", name);
                backend
                    .create_volume(&CreateVolumeRequest {
                        name: name.to_string(),
                        size_gb: options.size_gb()?,
                        fs_type: Some(self.fs_type(options).to_string()),
                    })
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        let attachment = backend.attach_volume(name, node).await?;
        info!("Attached {} to {} at {}", name, node, attachment.device);
        Ok(DriverResult::success().device(attachment.device).volume_name(name))
    }

    /// Detach `volume` from `node`. A volume the backend no longer knows is detached.
    pub async fn detach(&self, volume: &str, node: &str) -> Result<DriverResult, DriverError> {
        match self.backend()?.detach_volume(volume, node).await {
            Ok(()) => info!("Detached {} from {}", volume, node),
            Err(e) if e.is_not_found() => warn!("Volume {} not found on detach", volume),
            Err(e) => return Err(e.into()),
        }
        Ok(DriverResult::success())
    }

    pub async fn is_attached(&self, options: &VolumeOptions, node: &str) -> Result<DriverResult, DriverError> {
        let name = options.volume_name()?;
        let attached = match self.backend()?.get_volume(name).await {
            Ok(volume) => volume.is_attached_to(node),
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.into()),
        };
        Ok(DriverResult::success().attached(attached))
    }

    /// Report the device the volume is attached at.
    pub async fn wait_for_attach(&self, device: &str, options: &VolumeOptions) -> Result<DriverResult, DriverError> {
        let name = options.volume_name()?;
        let volume = self.backend()?.get_volume(name).await?;
        match volume.device {
            Some(attached) => {
                if !device.is_empty() && device != attached {
                    warn!("Kubelet expects {} at {}, backend reports {}", name, device, attached);
                }
                Ok(DriverResult::success().device(attached))
            }
            None => Ok(DriverResult::failure(format!("Volume {} is not attached", name))),
        }
    }

    pub fn volume_name(&self, options: &VolumeOptions) -> Result<DriverResult, DriverError> {
        Ok(DriverResult::success().volume_name(options.volume_name()?))
    }

    /// Mount the attached block device at the global mount point.
    pub async fn mount_device(
        &self,
        mount_dir: &Path,
        device: &str,
        options: &VolumeOptions,
    ) -> Result<DriverResult, DriverError> {
        fs::create_dir_all(mount_dir).await?;
        self.mounter
            .mount(device, mount_dir, self.fs_type(options), options.read_only())
            .await?;
        info!("Mounted {} at {}", device, mount_dir.display());
        Ok(DriverResult::success())
    }

    pub async fn unmount_device(&self, mount_dir: &Path) -> Result<DriverResult, DriverError> {
        if fs::metadata(mount_dir).await.is_err() {
            debug!("{} does not exist, nothing to unmount", mount_dir.display());
            return Ok(DriverResult::success());
        }
        self.mounter.unmount(mount_dir).await?;
        info!("Unmounted {}", mount_dir.display());
        Ok(DriverResult::success())
    }

    /// Link the pod's volume directory to the volume's directory under the mount root.
    pub async fn mount(&self, mount_dir: &Path, options: &VolumeOptions) -> Result<DriverResult, DriverError> {
        let name = options.volume_name()?;
        let source = self.volume_dir(name);
        fs::create_dir_all(&source).await?;

        if let Some(parent) = mount_dir.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::symlink_metadata(mount_dir).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                if fs::read_link(mount_dir).await? == source {
                    return Ok(DriverResult::success());
                }
                fs::remove_file(mount_dir).await?;
            }
            // The kubelet pre-creates an empty directory
            Ok(meta) if meta.is_dir() => fs::remove_dir(mount_dir).await?,
            Ok(_) => {
                return Err(DriverError::Mount(format!("{} exists and is not a directory", mount_dir.display())));
            }
            Err(_) => {}
        }

        symlink(&source, mount_dir).await?;
        info!(
            "Linked {} to {} for {}",
            mount_dir.display(),
            source.display(),
            options.pv_name().unwrap_or(name)
        );
        Ok(DriverResult::success())
    }

    /// Remove the pod's link. The volume's data directory is left in place.
    pub async fn unmount(&self, mount_dir: &Path) -> Result<DriverResult, DriverError> {
        match fs::symlink_metadata(mount_dir).await {
            Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(mount_dir).await?,
            Ok(meta) if meta.is_dir() => fs::remove_dir(mount_dir).await?,
            Ok(_) => fs::remove_file(mount_dir).await?,
            Err(_) => debug!("{} already gone", mount_dir.display()),
        }
        Ok(DriverResult::success())
    }

    fn fs_type<'a>(&'a self, options: &'a VolumeOptions) -> &'a str {
        options.fs_type().unwrap_or_else(|| self.config.effective_fs_type())
    }

    fn volume_dir(&self, name: &str) -> PathBuf {
        Path::new(self.config.effective_mount_root()).join(name)
    }
}

#[cfg(unix)]
async fn symlink(source: &Path, link: &Path) -> Result<(), DriverError> {
    fs::symlink(source, link).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn symlink(_source: &Path, link: &Path) -> Result<(), DriverError> {
    Err(DriverError::Mount(format!("cannot link {}: symlinks need a unix host", link.display())))
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("backend", &self.backend.as_ref().map(|b| b.base_url().to_string()))
            .finish_non_exhaustive()
    }
}

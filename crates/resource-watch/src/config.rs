//! Driver configuration: durable JSON file plus an in-memory cache
//!
//! `ConfigCache` is built once at process start and shared. Reads are served
//! from the cache after the first load; updates write the file first and then
//! replace the cached value, both under one async lock.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Backend port used when the config does not set one.
pub const DEFAULT_SERVER_PORT: u16 = 9500;
/// Directory holding per-volume mount links when the config does not set one.
pub const DEFAULT_MOUNT_ROOT: &str = "/var/lib/flexvol/mounts";
/// Filesystem used when neither the request nor the config sets one.
pub const DEFAULT_FS_TYPE: &str = "ext4";

/// Configuration shared by the driver and the controller.
///
/// Every field may be absent on disk; an absent file is the empty default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlexConfig {
    /// Cluster IP of the storage backend Service
    #[serde(skip_serializing_if = "String::is_empty")]
    pub server_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,
}

impl FlexConfig {
    pub fn effective_port(&self) -> u16 {
        self.server_port.unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn effective_mount_root(&self) -> &str {
        self.mount_root.as_deref().unwrap_or(DEFAULT_MOUNT_ROOT)
    }

    pub fn effective_fs_type(&self) -> &str {
        self.fs_type.as_deref().unwrap_or(DEFAULT_FS_TYPE)
    }

    /// Base URL of the storage backend, if its address is known.
    pub fn backend_url(&self) -> Option<String> {
        if self.server_address.is_empty() {
            return None;
        }
        Some(format!("http://{}:{}", self.server_address, self.effective_port()))
    }
}

/// Durable storage for `FlexConfig`.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the stored config; `None` if nothing has been stored yet.
    async fn load(&self) -> Result<Option<FlexConfig>, ConfigError>;

    /// Replace the stored config. Readers never observe a partial write.
    async fn save(&self, config: &FlexConfig) -> Result<(), ConfigError>;
}

/// Whole-file JSON store.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<Option<FlexConfig>, ConfigError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(ConfigError::io(&self.path)(e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save(&self, config: &FlexConfig) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(ConfigError::io(dir))?;
        }

        let data = serde_json::to_vec_pretty(config)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &data).await.map_err(ConfigError::io(&temp_path))?;
        fs::rename(&temp_path, &self.path).await.map_err(ConfigError::io(&self.path))?;
        Ok(())
    }
}

/// Cached view of the durable config.
pub struct ConfigCache {
    store: Arc<dyn ConfigStore>,
    cached: Mutex<Option<FlexConfig>>,
}

impl ConfigCache {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Cache backed by a JSON file at `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileConfigStore::new(path)))
    }

    /// The current config, loading it on first use.
    pub async fn current_config(&self) -> Result<FlexConfig, ConfigError> {
        let mut cached = self.cached.lock().await;
        if let Some(config) = cached.as_ref() {
            return Ok(config.clone());
        }
        let config = self.store.load().await?.unwrap_or_default();
        *cached = Some(config.clone());
        Ok(config)
    }

    /// Persist `config`, then make it the cached value.
    ///
    /// If the write fails the cache keeps its previous value.
    pub async fn update_config(&self, config: FlexConfig) -> Result<(), ConfigError> {
        let mut cached = self.cached.lock().await;
        self.store.save(&config).await?;
        info!("Updated config: server address '{}'", config.server_address);
        *cached = Some(config);
        Ok(())
    }

    /// Forget the cached value; the next read goes to the store.
    pub async fn clear_cache(&self) {
        *self.cached.lock().await = None;
    }
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigCache::from_path(dir.path().join("config.json"));
        assert_eq!(cache.current_config().await.unwrap(), FlexConfig::default());
    }

    #[tokio::test]
    async fn test_update_persists_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let cache = ConfigCache::from_path(&path);

        let config = FlexConfig {
            server_address: "10.0.0.7".to_string(),
            ..FlexConfig::default()
        };
        cache.update_config(config.clone()).await.unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"serverAddress": "10.0.0.7"}));
        assert!(!path.with_extension("json.tmp").exists());

        // Written behind the cache's back; the cached value still wins
        std::fs::write(&path, r#"{"serverAddress": "10.0.0.8"}"#).unwrap();
        assert_eq!(cache.current_config().await.unwrap(), config);

        cache.clear_cache().await;
        assert_eq!(cache.current_config().await.unwrap().server_address, "10.0.0.8");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = ConfigCache::from_path(&path).current_config().await.unwrap_err();
        assert!(matches!(err, ConfigError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_io_error_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let store = FileConfigStore::new(blocker.join("config.json"));
        let err = store.save(&FlexConfig::default()).await.unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert_eq!(path, blocker),
            other => panic!("Expected an I/O error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_and_backend_url() {
        let config: FlexConfig = serde_json::from_str(r#"{"serverAddress": "1.2.3.4", "fsType": "xfs"}"#).unwrap();
        assert_eq!(config.backend_url().as_deref(), Some("http://1.2.3.4:9500"));
        assert_eq!(config.effective_fs_type(), "xfs");
        assert_eq!(config.effective_mount_root(), DEFAULT_MOUNT_ROOT);
        assert_eq!(FlexConfig::default().backend_url(), None);
    }
}

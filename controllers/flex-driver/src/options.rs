//! JSON options passed by the kubelet.
//!
//! The kubelet merges the volume's `options` map with its own
//! `kubernetes.io/*` keys. Every value arrives as a string.

use crate::error::DriverError;
use serde::Deserialize;
use std::collections::HashMap;

const DEFAULT_SIZE_GB: u64 = 1;

/// Options of one driver call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VolumeOptions {
    #[serde(rename = "volumeName", alias = "volumeID")]
    volume_name: Option<String>,
    #[serde(rename = "kubernetes.io/fsType")]
    fs_type: Option<String>,
    #[serde(rename = "size")]
    size_gb: Option<String>,
    #[serde(rename = "kubernetes.io/pvOrVolumeName")]
    pv_name: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl VolumeOptions {
    pub fn parse(raw: &str) -> Result<Self, DriverError> {
        serde_json::from_str(raw).map_err(|e| DriverError::InvalidOptions(e.to_string()))
    }

    /// Backend volume name.
    pub fn volume_name(&self) -> Result<&str, DriverError> {
        self.volume_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| DriverError::InvalidOptions("volumeName (or volumeID) is required".to_string()))
    }

    /// Requested filesystem, if any.
    pub fn fs_type(&self) -> Option<&str> {
        self.fs_type.as_deref().filter(|fs| !fs.is_empty())
    }

    /// Size for a volume created on first attach.
    pub fn size_gb(&self) -> Result<u64, DriverError> {
        match self.size_gb.as_deref() {
            None => Ok(DEFAULT_SIZE_GB),
            Some(size) => size
                .trim_end_matches("Gi")
                .parse()
                .map_err(|_| DriverError::InvalidOptions(format!("size is not a number of GB: '{}'", size))),
        }
    }

    /// PV (or inline volume) name the kubelet uses for this volume.
    pub fn pv_name(&self) -> Option<&str> {
        self.pv_name.as_deref()
    }

    /// Whether the kubelet asked for a read-only mount.
    pub fn read_only(&self) -> bool {
        self.other
            .get("kubernetes.io/readwrite")
            .and_then(serde_json::Value::as_str)
            == Some("ro")
    }
}

//! Controller settings loaded from environment variables.

use crate::error::ControllerError;
use cluster_client::{ResourceKind, ResourceSelector};
use std::path::PathBuf;

pub const DEFAULT_NAMESPACE: &str = "flexvol-system";
pub const DEFAULT_SERVICE_NAME: &str = "flexvol-backend";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flexvol/config.json";
pub const DEFAULT_BACKEND_PORT: u16 = 9500;

/// Where the backend lives and where the driver config is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Namespace of the backend Service and of workflow targets
    pub namespace: String,
    pub service_name: String,
    pub config_path: PathBuf,
    pub backend_port: u16,
}

impl Settings {
    /// Read `FLEX_NAMESPACE`, `FLEX_SERVICE_NAME`, `FLEX_CONFIG_PATH` and `FLEX_BACKEND_PORT`.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let backend_port = match lookup("FLEX_BACKEND_PORT") {
            Some(port) => port.parse().map_err(|_| {
                ControllerError::InvalidConfig(format!("FLEX_BACKEND_PORT is not a port number: '{}'", port))
            })?,
            None => DEFAULT_BACKEND_PORT,
        };

        Ok(Self {
            namespace: lookup("FLEX_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            service_name: lookup("FLEX_SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            config_path: lookup("FLEX_CONFIG_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from),
            backend_port,
        })
    }

    /// The Service whose cluster IP is mirrored into the config.
    pub fn backend_service(&self) -> ResourceSelector {
        ResourceSelector::namespaced(ResourceKind::Service, &self.namespace, &self.service_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.namespace, "flexvol-system");
        assert_eq!(settings.config_path, PathBuf::from("/etc/flexvol/config.json"));
        assert_eq!(settings.backend_port, 9500);
        assert_eq!(settings.backend_service().to_string(), "Service flexvol-system/flexvol-backend");
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("FLEX_NAMESPACE", "storage"),
            ("FLEX_SERVICE_NAME", "backend"),
            ("FLEX_BACKEND_PORT", "8080"),
        ]))
        .unwrap();
        assert_eq!(settings.backend_service(), ResourceSelector::namespaced(ResourceKind::Service, "storage", "backend"));
        assert_eq!(settings.backend_port, 8080);
    }

    #[test]
    fn test_invalid_port() {
        let err = Settings::from_lookup(lookup(&[("FLEX_BACKEND_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}

//! JSON result printed for every driver call.

use serde::Serialize;

/// Outcome of a driver call, as the kubelet expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Success,
    Failure,
    #[serde(rename = "Not supported")]
    NotSupported,
}

/// Features advertised by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub attach: bool,
}

/// The single JSON object written to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverResult {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

impl DriverResult {
    fn with_status(status: Status) -> Self {
        Self {
            status,
            message: None,
            device: None,
            volume_name: None,
            attached: None,
            capabilities: None,
        }
    }

    pub fn success() -> Self {
        Self::with_status(Status::Success)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::with_status(Status::Failure).message(message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::with_status(Status::NotSupported).message(message)
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn volume_name(mut self, name: impl Into<String>) -> Self {
        self.volume_name = Some(name.into());
        self
    }

    pub fn attached(mut self, attached: bool) -> Self {
        self.attached = Some(attached);
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Render as one line of JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"Failure","message":"failed to encode result: {}"}}"#, e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_are_omitted() {
        assert_eq!(DriverResult::success().to_json(), r#"{"status":"Success"}"#);
    }

    #[test]
    fn test_not_supported_spelling() {
        let json = DriverResult::not_supported("expandvolume").to_json();
        assert_eq!(json, r#"{"status":"Not supported","message":"expandvolume"}"#);
    }

    #[test]
    fn test_init_shape() {
        let json = DriverResult::success().capabilities(Capabilities { attach: true }).to_json();
        assert_eq!(json, r#"{"status":"Success","capabilities":{"attach":true}}"#);
    }
}

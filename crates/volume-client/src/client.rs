//! Storage backend API client
//!
//! Implements the storage backend REST API client for volume operations.
//! Endpoints live under `/api/v1/volumes/`.

use crate::error::VolumeError;
use crate::models::*;
use crate::volume_trait::VolumeClientTrait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Storage backend API client
pub struct VolumeClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl VolumeClient {
    /// Create a new storage backend client
    ///
    /// # Arguments
    /// * `base_url` - Backend base URL (e.g., "http://10.0.0.12:9500")
    /// * `token` - Optional bearer token for authentication
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, VolumeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(VolumeError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn volumes_url(&self) -> String {
        format!("{}/api/v1/volumes", self.base_url)
    }

    fn volume_url(&self, name: &str) -> Result<String, VolumeError> {
        if name.is_empty() {
            return Err(VolumeError::InvalidRequest("volume name is empty".to_string()));
        }
        Ok(format!("{}/{}", self.volumes_url(), urlencoding::encode(name)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map non-success statuses onto `VolumeError`, passing successful responses through.
    async fn check(response: Response, what: &str) -> Result<Response, VolumeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);

        match status {
            StatusCode::NOT_FOUND => Err(VolumeError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VolumeError::Authentication(format!(
                "{}: {} - {}",
                what, status, message
            ))),
            StatusCode::BAD_REQUEST => Err(VolumeError::InvalidRequest(format!("{}: {}", what, message))),
            _ => Err(VolumeError::Api(format!("{}: {} - {}", what, status, message))),
        }
    }
}

#[async_trait::async_trait]
impl VolumeClientTrait for VolumeClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a volume
    ///
    /// # Returns
    /// * `Ok(Volume)` - The created volume
    /// * `Err(VolumeError)` - If the request fails
    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<Volume, VolumeError> {
        if request.name.is_empty() {
            return Err(VolumeError::InvalidRequest("volume name is empty".to_string()));
        }
        debug!("Creating volume {} ({} GB)", request.name, request.size_gb);

        let response = self
            .authorize(self.client.post(self.volumes_url()))
            .json(request)
            .send()
            .await?;
        let response = Self::check(response, &format!("create volume {}", request.name)).await?;
        Ok(response.json().await?)
    }

    /// Remove a volume
    async fn remove_volume(&self, name: &str) -> Result<(), VolumeError> {
        let url = self.volume_url(name)?;
        debug!("Removing volume {}", name);

        let response = self.authorize(self.client.delete(&url)).send().await?;
        Self::check(response, &format!("volume {}", name)).await?;
        Ok(())
    }

    /// Attach a volume to a node
    ///
    /// # Returns
    /// * `Ok(Attachment)` - Device path of the volume on that node
    /// * `Err(VolumeError)` - If the request fails
    async fn attach_volume(&self, name: &str, node: &str) -> Result<Attachment, VolumeError> {
        let url = format!("{}/attach", self.volume_url(name)?);
        debug!("Attaching volume {} to node {}", name, node);

        let response = self
            .authorize(self.client.post(&url))
            .json(&NodeRequest { node: node.to_string() })
            .send()
            .await?;
        let response = Self::check(response, &format!("volume {}", name)).await?;
        Ok(response.json().await?)
    }

    /// Detach a volume from a node
    async fn detach_volume(&self, name: &str, node: &str) -> Result<(), VolumeError> {
        let url = format!("{}/detach", self.volume_url(name)?);
        debug!("Detaching volume {} from node {}", name, node);

        let response = self
            .authorize(self.client.post(&url))
            .json(&NodeRequest { node: node.to_string() })
            .send()
            .await?;
        Self::check(response, &format!("volume {}", name)).await?;
        Ok(())
    }

    /// List all volumes known to the backend
    async fn list_volumes(&self) -> Result<Vec<Volume>, VolumeError> {
        debug!("Listing volumes");
        let response = self.authorize(self.client.get(self.volumes_url())).send().await?;
        let response = Self::check(response, "list volumes").await?;

        // Capture the body for better error messages on decode failures
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            VolumeError::Api(format!(
                "error decoding volume list: {} - Response (first 500 chars): {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    /// Get one volume by name
    async fn get_volume(&self, name: &str) -> Result<Volume, VolumeError> {
        let url = self.volume_url(name)?;
        debug!("Fetching volume {}", name);

        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = Self::check(response, &format!("volume {}", name)).await?;
        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for VolumeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

//! Attachment Store Client
//!
//! Issuance and upload of attachment objects live in an external
//! collaborator; this client only purges a bound object when its message is
//! deleted for everyone. Purges are best-effort.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::AttachmentSettings;
use crate::domain::AttachmentStore;
use crate::shared::error::AppError;

/// HTTP attachment-store client.
pub struct HttpAttachmentStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpAttachmentStore {
    pub fn new(settings: &AttachmentSettings) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl AttachmentStore for HttpAttachmentStore {
    async fn purge(&self, key: &str) -> Result<(), AppError> {
        let url = format!("{}/v1/objects/{}", self.endpoint, key);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("attachment purge failed: {}", e)))?;

        // An already-gone object is a successful purge.
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        Err(AppError::ExternalService(format!(
            "attachment store returned {}",
            response.status()
        )))
    }
}

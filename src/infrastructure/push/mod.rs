//! Push Provider Implementation
//!
//! HTTP client for the external push provider. Pushes are best-effort with
//! a single retry; callers log and swallow failures.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::PushSettings;
use crate::domain::{PushMessage, PushProvider};
use crate::shared::error::AppError;

/// HTTP push provider.
pub struct HttpPushProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpPushProvider {
    pub fn new(settings: &PushSettings) -> Result<Self, AppError> {
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
impl PushProvider for HttpPushProvider {
    async fn push(&self, message: PushMessage) -> Result<(), AppError> {
        let url = format!("{}/v1/notifications", self.endpoint);
        let mut last_error = String::new();

        for attempt in 0..2 {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&message)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(user_id = message.user_id, "Push accepted");
                    return Ok(());
                }
                Ok(resp) => {
                    last_error = format!("push provider returned {}", resp.status());
                }
                Err(e) => {
                    last_error = format!("push request failed: {}", e);
                }
            }

            if attempt == 0 {
                tracing::debug!(user_id = message.user_id, error = %last_error, "Retrying push");
            }
        }

        Err(AppError::ExternalService(last_error))
    }
}

//! Translation Gateway Implementation
//!
//! HTTP client for the external translation service. Detection and the two
//! translation paths (short text, long-form document) are separate
//! endpoints. Calls can take hundreds of milliseconds and are retried once;
//! callers fall back to original content on failure, never failing a send.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::TranslationSettings;
use crate::domain::{TranslateRequest, TranslationGateway};
use crate::shared::error::AppError;

/// HTTP translation gateway.
pub struct HttpTranslationGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTranslationGateway {
    pub fn new(settings: &TranslationSettings) -> Result<Self, AppError> {
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

    /// POST a request, retrying once.
    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut last_error = String::new();

        for attempt in 0..2 {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    return resp.json::<T>().await.map_err(|e| {
                        AppError::ExternalService(format!(
                            "Translation response decode failed: {}",
                            e
                        ))
                    });
                }
                Ok(resp) => {
                    last_error = format!("translation service returned {}", resp.status());
                }
                Err(e) => {
                    last_error = format!("translation request failed: {}", e);
                }
            }

            if attempt == 0 {
                tracing::debug!(url = %url, error = %last_error, "Retrying translation call");
            }
        }

        Err(AppError::ExternalService(last_error))
    }
}

#[derive(Debug, Serialize)]
struct DetectBody<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    language: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateBody<'a> {
    text: &'a str,
    source_language: &'a str,
    target_language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_country: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_region: Option<&'a str>,
}

impl<'a> TranslateBody<'a> {
    fn from_request(request: &'a TranslateRequest) -> Self {
        Self {
            text: &request.text,
            source_language: &request.source_language,
            target_language: &request.target_language,
            target_country: request.target_country.as_deref(),
            target_region: request.target_region.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[async_trait]
impl TranslationGateway for HttpTranslationGateway {
    async fn detect_language(&self, text: &str) -> Result<String, AppError> {
        let response: DetectResponse = self.post_json("/v1/detect", &DetectBody { text }).await?;
        Ok(response.language)
    }

    async fn translate(&self, request: TranslateRequest) -> Result<String, AppError> {
        let response: TranslateResponse = self
            .post_json("/v1/translate", &TranslateBody::from_request(&request))
            .await?;
        Ok(response.translated_text)
    }

    async fn translate_document(&self, request: TranslateRequest) -> Result<String, AppError> {
        let response: TranslateResponse = self
            .post_json("/v1/translate/document", &TranslateBody::from_request(&request))
            .await?;
        Ok(response.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_body_omits_empty_hints() {
        let request = TranslateRequest {
            text: "Hello".into(),
            source_language: "en".into(),
            target_language: "es".into(),
            target_country: None,
            target_region: None,
        };

        let json = serde_json::to_value(TranslateBody::from_request(&request)).unwrap();
        assert!(json.get("targetCountry").is_none());
        assert_eq!(json["targetLanguage"], "es");
    }

    #[test]
    fn test_translate_body_includes_country_hint() {
        let request = TranslateRequest {
            text: "Hello".into(),
            source_language: "en".into(),
            target_language: "es".into(),
            target_country: Some("MX".into()),
            target_region: Some("Jalisco".into()),
        };

        let json = serde_json::to_value(TranslateBody::from_request(&request)).unwrap();
        assert_eq!(json["targetCountry"], "MX");
        assert_eq!(json["targetRegion"], "Jalisco");
    }
}

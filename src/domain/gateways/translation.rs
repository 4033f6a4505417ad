//! Translation gateway trait.
//!
//! Language detection and translation with a country/region hint. Used as a
//! pure capability: detection runs once per send and only for text, and a
//! (message, target language) pair is translated at most once — callers
//! consult the message's translation cache first.

use async_trait::async_trait;

use crate::shared::error::AppError;

/// One translation request.
///
/// The country/region hint biases vocabulary and register, not just the
/// language choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateRequest {
    pub text: String,
    pub source_language: String,
    pub target_language: String,
    pub target_country: Option<String>,
    pub target_region: Option<String>,
}

/// Language detection + translation capability.
#[async_trait]
pub trait TranslationGateway: Send + Sync {
    /// Detect the language of a short text. Never invoked for non-text
    /// message kinds; those are translation-exempt.
    async fn detect_language(&self, text: &str) -> Result<String, AppError>;

    /// Short-text translation path.
    async fn translate(&self, request: TranslateRequest) -> Result<String, AppError>;

    /// Long-form document translation path, opt-in per send.
    async fn translate_document(&self, request: TranslateRequest) -> Result<String, AppError>;
}

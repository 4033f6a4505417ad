//! Attachment store trait.
//!
//! Object issuance and upload live in an external collaborator; the core
//! only purges a bound object when a message is deleted for everyone.

use async_trait::async_trait;

use crate::shared::error::AppError;

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Best-effort removal of a stored object by key.
    async fn purge(&self, key: &str) -> Result<(), AppError>;
}

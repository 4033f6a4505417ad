//! Push provider trait.
//!
//! Best-effort delivery to offline participants. Failures are logged and
//! swallowed by callers; a push never fails or blocks a send.

use async_trait::async_trait;
use serde::Serialize;

use crate::shared::error::AppError;

/// One push notification.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub user_id: i64,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn push(&self, message: PushMessage) -> Result<(), AppError>;
}

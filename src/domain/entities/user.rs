//! User identity snapshot and directory trait.
//!
//! Users are owned by an external identity collaborator; this core only
//! reads the fields that drive per-recipient translation and delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Read-only user snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// BCP-47-ish language code, e.g. "en", "es"
    pub preferred_language: String,
    /// Country hint biasing translation vocabulary, e.g. "MX"
    pub preferred_country: Option<String>,
    /// Region hint, finer-grained than country
    pub preferred_region: Option<String>,
    pub avatar_url: Option<String>,
}

impl User {
    /// Country/region hint passed to the translation gateway.
    pub fn locale_hint(&self) -> (Option<&str>, Option<&str>) {
        (
            self.preferred_country.as_deref(),
            self.preferred_region.as_deref(),
        )
    }
}

/// Read-only lookup into the external identity store.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    /// Batch lookup; missing ids are simply absent from the result.
    async fn find_many(&self, ids: &[i64]) -> Result<Vec<User>, AppError>;
}

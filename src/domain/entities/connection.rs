//! Live-connection metadata.
//!
//! Connections are ephemeral, many-to-one with users. They are created on
//! transport open and destroyed on close or lazily when a push reports the
//! connection gone; the TTL is only a backstop.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Metadata for one live connection in the registry.
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: Uuid,
    pub user_id: i64,
    pub connected_at: DateTime<Utc>,
    /// TTL backstop; refreshed on register and on inbound activity
    pub expires_at: DateTime<Utc>,
}

impl Connection {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

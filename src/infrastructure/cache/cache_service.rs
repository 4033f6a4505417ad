//! Cache Service
//!
//! Generic cache trait and Redis implementation for application-wide caching.
//!
//! Values are stored as JSON strings; keys may be namespaced with a prefix.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::shared::error::AppError;

/// Generic cache trait for abstracting cache operations.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Retrieves a value from the cache by key.
    ///
    /// Returns `Ok(None)` when the key does not exist.
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Stores a value in the cache with an expiration time in seconds.
    async fn set_ex<T: Serialize + Sync + Send>(
        &self,
        key: &str,
        value: &T,
        seconds: u64,
    ) -> Result<(), AppError>;

    /// Deletes a key. Returns true when the key existed.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
}

/// Redis-backed cache implementation.
///
/// Uses a Redis ConnectionManager for connection pooling and automatic
/// reconnection handling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    /// Optional key prefix for namespacing
    prefix: Option<Arc<str>>,
}

impl RedisCache {
    /// Creates a new RedisCache instance.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, prefix: None }
    }

    /// Creates a new RedisCache instance with a key prefix.
    pub fn with_prefix(conn: ConnectionManager, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            conn,
            prefix: Some(prefix.into()),
        }
    }

    /// Formats a key with the optional prefix.
    fn format_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn serialize<T: Serialize>(value: &T) -> Result<String, AppError> {
        serde_json::to_string(value).map_err(|e| {
            warn!("Cache serialization error: {}", e);
            AppError::Internal(format!("Cache serialization failed: {}", e))
        })
    }

    fn deserialize<T: DeserializeOwned>(data: &str) -> Result<T, AppError> {
        serde_json::from_str(data).map_err(|e| {
            warn!("Cache deserialization error: {}", e);
            AppError::Internal(format!("Cache deserialization failed: {}", e))
        })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let result: Option<String> = conn.get(&full_key).await?;

        match result {
            Some(data) => {
                debug!(key = %full_key, "Cache hit");
                let value = Self::deserialize(&data)?;
                Ok(Some(value))
            }
            None => {
                debug!(key = %full_key, "Cache miss");
                Ok(None)
            }
        }
    }

    async fn set_ex<T: Serialize + Sync + Send>(
        &self,
        key: &str,
        value: &T,
        seconds: u64,
    ) -> Result<(), AppError> {
        let full_key = self.format_key(key);
        let data = Self::serialize(value)?;
        let mut conn = self.conn.clone();

        let _: () = conn.set_ex(&full_key, data, seconds).await?;
        debug!(key = %full_key, ttl = seconds, "Cache set with expiry");

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let deleted: u64 = conn.del(&full_key).await?;
        Ok(deleted > 0)
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        id: i32,
        name: String,
    }

    #[test]
    fn test_serialization_round_trip() {
        let data = TestData {
            id: 1,
            name: "test".to_string(),
        };

        let json = RedisCache::serialize(&data).unwrap();
        let parsed: TestData = RedisCache::deserialize(&json).unwrap();

        assert_eq!(data, parsed);
    }

    #[test]
    fn test_format_key_with_prefix() {
        let prefix: Option<Arc<str>> = Some("lingua:v1:".into());
        let key = "user:123";
        let result = match &prefix {
            Some(p) => format!("{}{}", p, key),
            None => key.to_string(),
        };
        assert_eq!(result, "lingua:v1:user:123");
    }
}

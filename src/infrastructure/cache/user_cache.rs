//! User Snapshot Cache
//!
//! Decorates a [`UserDirectory`] with a Redis TTL cache. The dispatcher
//! resolves every recipient's language/country on each send, so the profile
//! snapshot is the hottest read in the pipeline. Cache failures degrade to
//! the backing directory.

use async_trait::async_trait;
use futures::future::join_all;

use super::cache_service::{Cache, RedisCache};
use crate::domain::{User, UserDirectory};
use crate::shared::error::AppError;

const USER_KEY_PREFIX: &str = "user:";
const DEFAULT_TTL_SECS: u64 = 300;

/// Read-through user cache.
pub struct CachedUserDirectory<D> {
    inner: D,
    cache: RedisCache,
    ttl_secs: u64,
}

impl<D> CachedUserDirectory<D> {
    pub fn new(inner: D, cache: RedisCache) -> Self {
        Self {
            inner,
            cache,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    pub fn with_ttl(inner: D, cache: RedisCache, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache,
            ttl_secs,
        }
    }

    fn key(id: i64) -> String {
        format!("{}{}", USER_KEY_PREFIX, id)
    }
}

#[async_trait]
impl<D: UserDirectory> UserDirectory for CachedUserDirectory<D> {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let key = Self::key(id);

        match self.cache.get::<User>(&key).await {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user_id = id, error = %e, "User cache read failed");
            }
        }

        let user = self.inner.find_by_id(id).await?;
        if let Some(user) = &user {
            if let Err(e) = self.cache.set_ex(&key, user, self.ttl_secs).await {
                tracing::warn!(user_id = id, error = %e, "User cache write failed");
            }
        }
        Ok(user)
    }

    async fn find_many(&self, ids: &[i64]) -> Result<Vec<User>, AppError> {
        let lookups = join_all(ids.iter().map(|id| self.find_by_id(*id))).await;

        let mut users = Vec::with_capacity(ids.len());
        for result in lookups {
            if let Some(user) = result? {
                users.push(user);
            }
        }
        Ok(users)
    }
}

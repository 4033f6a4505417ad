//! Cache Module
//!
//! Redis connection management and caching utilities.
//!
//! The cache is used to keep recipient profile lookups off the hot fan-out
//! path; it is never a correctness dependency. A miss or a Redis failure
//! always falls through to the backing directory.

mod cache_service;
mod user_cache;

pub use cache_service::{Cache, RedisCache};
pub use user_cache::CachedUserDirectory;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RedisSettings;

/// Creates a Redis connection manager with automatic reconnection.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

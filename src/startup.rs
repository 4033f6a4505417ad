//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::application::services::{EventDispatcher, NotificationFallback};
use crate::config::Settings;
use crate::infrastructure::attachments::HttpAttachmentStore;
use crate::infrastructure::auth::JwtAuthGateway;
use crate::infrastructure::cache::{self, CachedUserDirectory, RedisCache};
use crate::infrastructure::database;
use crate::infrastructure::push::HttpPushProvider;
use crate::infrastructure::registry::ConnectionRegistry;
use crate::infrastructure::repositories::{
    PgConversationDirectory, PgMessageStore, PgUserDirectory,
};
use crate::infrastructure::translation::HttpTranslationGateway;
use crate::presentation::http::routes;
use crate::presentation::middleware::create_cors_layer;
use crate::shared::snowflake::SnowflakeGenerator;

/// The fully wired dispatcher used by the running server.
pub type Dispatcher = EventDispatcher<
    PgMessageStore,
    PgConversationDirectory,
    CachedUserDirectory<PgUserDirectory>,
    HttpTranslationGateway,
    HttpPushProvider,
    HttpAttachmentStore,
>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub auth: Arc<JwtAuthGateway>,
    pub users: Arc<CachedUserDirectory<PgUserDirectory>>,
    pub snowflake: Arc<SnowflakeGenerator>,
    pub settings: Arc<Settings>,
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        // Create database pool and apply migrations
        let db = database::create_pool(&settings.database).await?;
        database::run_migrations(&db).await?;
        tracing::info!("Database connection pool created");

        // Create Redis-backed user snapshot cache
        let redis = cache::create_redis_client(&settings.redis).await?;
        let user_cache = RedisCache::with_prefix(redis, "lingua:");
        tracing::info!("Redis connection established");

        // Create snowflake generator
        let snowflake = Arc::new(SnowflakeGenerator::new(
            settings.snowflake.machine_id as u64,
            0u64, // Default node_id
        ));

        // Stores and directories
        let store = Arc::new(PgMessageStore::new(db.clone(), snowflake.clone()));
        let directory = Arc::new(PgConversationDirectory::new(db.clone(), snowflake.clone()));
        let users = Arc::new(CachedUserDirectory::with_ttl(
            PgUserDirectory::new(db.clone()),
            user_cache,
            settings.redis.user_cache_ttl_secs,
        ));

        // External collaborators
        let translator = Arc::new(HttpTranslationGateway::new(&settings.translation)?);
        let push_provider = Arc::new(HttpPushProvider::new(&settings.push)?);
        let attachments = Arc::new(HttpAttachmentStore::new(&settings.attachments)?);

        // Realtime plumbing
        let registry = Arc::new(ConnectionRegistry::new(
            settings.websocket.connection_ttl_secs,
        ));
        let notifications =
            NotificationFallback::new(push_provider, settings.push.always_push);
        let dispatcher = Arc::new(EventDispatcher::new(
            store,
            directory,
            users.clone(),
            translator,
            attachments,
            notifications,
            registry.clone(),
        ));

        let auth = Arc::new(JwtAuthGateway::new(settings.jwt.secret.clone()));

        // Create app state
        let state = AppState {
            db,
            registry,
            dispatcher,
            auth,
            users,
            snowflake,
            settings: Arc::new(settings.clone()),
        };

        // Build router with middleware
        let router = routes::create_router(state)
            .layer(TraceLayer::new_for_http())
            .layer(create_cors_layer(&settings.cors));

        // Bind to address
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

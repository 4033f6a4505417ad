//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Redis configuration
    pub redis: RedisSettings,

    /// JWT validation settings
    pub jwt: JwtSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// Translation service settings
    pub translation: TranslationSettings,

    /// Push provider settings
    pub push: PushSettings,

    /// Attachment store settings (purge endpoint)
    pub attachments: AttachmentSettings,

    /// WebSocket configuration
    pub websocket: WebSocketSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,

    /// TTL for cached user snapshots in seconds
    pub user_cache_ttl_secs: u64,
}

/// JWT validation configuration. Token issuance lives in the identity
/// service; only the shared secret is needed here.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for validating tokens
    pub secret: String,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-31)
    pub machine_id: u16,
}

/// Translation service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationSettings {
    /// Base URL of the translation service
    pub endpoint: String,

    /// API key sent as a bearer token
    pub api_key: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

/// Push provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushSettings {
    /// Base URL of the push provider
    pub endpoint: String,

    /// API key sent as a bearer token
    pub api_key: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Push every participant after fan-out even when they have live
    /// connections. Intended for debugging delivery issues.
    pub always_push: bool,
}

/// Attachment store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentSettings {
    /// Base URL of the attachment store
    pub endpoint: String,

    /// API key sent as a bearer token
    pub api_key: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum message size in bytes (default: 64KB)
    /// Protects against DoS via oversized messages
    pub max_message_size: usize,

    /// Connection TTL backstop in seconds; refreshed on inbound activity
    pub connection_ttl_secs: u64,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if JWT secret is too short.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("redis.user_cache_ttl_secs", 300)?
            .set_default("snowflake.machine_id", 1)?
            .set_default("translation.endpoint", "http://localhost:8091")?
            .set_default("translation.api_key", "")?
            .set_default("translation.timeout_ms", 2000)?
            .set_default("push.endpoint", "http://localhost:8092")?
            .set_default("push.api_key", "")?
            .set_default("push.timeout_ms", 2000)?
            .set_default("push.always_push", false)?
            .set_default("attachments.endpoint", "http://localhost:8093")?
            .set_default("attachments.api_key", "")?
            .set_default("attachments.timeout_ms", 2000)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            // WebSocket settings - security limits to prevent DoS
            .set_default("websocket.max_message_size", 65536_i64)? // 64KB
            .set_default("websocket.connection_ttl_secs", 900_i64)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "translation.api_key",
                std::env::var("TRANSLATION_API_KEY").ok(),
            )?
            .set_override_option("push.api_key", std::env::var("PUSH_API_KEY").ok())?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                // Validate JWT secret length for security
                if settings.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
                    return Err(ConfigError::Message(format!(
                        "JWT secret must be at least {} characters for security. Current length: {}",
                        MIN_JWT_SECRET_LENGTH,
                        settings.jwt.secret.len()
                    )));
                }
                Ok(settings)
            })
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerSettings {
    /// Get the socket address for binding.
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid server address configuration")
    }
}

impl DatabaseSettings {
    /// Get the connection URL.
    pub fn connection_url(&self) -> &str {
        &self.url
    }
}

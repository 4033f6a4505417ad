//! # Lingua Chat Server Library
//!
//! This crate provides the real-time distribution and translation core of a
//! multilingual chat application:
//! - WebSocket endpoint carrying tagged `{action, data}` events
//! - Per-recipient translation with per-message caching
//! - PostgreSQL for conversation visibility and message state
//! - Redis for recipient profile caching
//! - Push fallback for offline participants
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Core entities, store/directory traits, gateway traits
//! - **Application Layer**: Fan-out dispatcher, notification fallback, DTOs
//! - **Infrastructure Layer**: Database, cache, registry, HTTP collaborators
//! - **Presentation Layer**: HTTP handlers and the WebSocket endpoint
//!
//! ## Module Structure
//!
//! ```text
//! lingua_chat_server/
//! +-- config/         Configuration management
//! +-- domain/         Entities, store traits, and collaborator gateways
//! +-- application/    Dispatcher, notification fallback, and DTOs
//! +-- infrastructure/ Database, cache, registry, and HTTP clients
//! +-- presentation/   HTTP routes and WebSocket handler
//! +-- shared/         Common utilities (errors, snowflake IDs)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Fan-out pipeline
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;

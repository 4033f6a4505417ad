//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Database stores (PostgreSQL)
//! - Cache implementations (Redis)
//! - The in-process connection registry
//! - HTTP clients for translation, push and attachment purge
//! - JWT auth gateway

pub mod attachments;
pub mod auth;
pub mod cache;
pub mod database;
pub mod metrics;
pub mod push;
pub mod registry;
pub mod repositories;
pub mod translation;

//! Auth gateway trait.
//!
//! Token issuance is out of scope; the core only resolves a presented
//! token to a user id, for both HTTP requests and WebSocket handshakes.

use crate::shared::error::AppError;

pub trait AuthGateway: Send + Sync {
    /// Resolve a bearer token to the authenticated user id.
    fn authenticate(&self, token: &str) -> Result<i64, AppError>;
}

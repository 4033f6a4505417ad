//! Authentication Middleware
//!
//! Bearer-token validation for protected routes, delegating to the shared
//! auth gateway so HTTP and WebSocket handshakes resolve tokens the same
//! way.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::domain::AuthGateway;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Authenticated user extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
}

/// Authentication middleware that validates bearer tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    // Check for Bearer token
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header format".into()))?;

    let user_id = state.auth.authenticate(token)?;

    // Insert authenticated user into request extensions
    request.extensions_mut().insert(AuthUser { user_id });

    // Continue to the next handler
    Ok(next.run(request).await)
}

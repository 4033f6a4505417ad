//! Route Configuration
//!
//! Configures all HTTP routes for the API.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::auth_middleware;
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        // WebSocket gateway endpoint (token authenticated in the handshake)
        .route("/gateway", get(ws_handler))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes (all protected)
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            get(handlers::conversation::list_conversations)
                .post(handlers::conversation::create_conversation),
        )
        .route(
            "/conversations/{conversation_id}/participants",
            post(handlers::conversation::add_participants),
        )
        .route(
            "/conversations/{conversation_id}/participants/{user_id}",
            delete(handlers::conversation::remove_participant),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(handlers::message::get_messages),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

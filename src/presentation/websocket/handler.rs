//! WebSocket Connection Handler
//!
//! Handles one WebSocket connection: authenticate the handshake, register
//! the connection, pump inbound events into the dispatcher, and forward
//! outbound frames from the registry channel to the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::application::dto::ClientEvent;
use crate::domain::AuthGateway;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: String,
}

/// WebSocket upgrade handler. The token is resolved before upgrading so an
/// unauthenticated socket never reaches the registry.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<GatewayQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let user_id = state.auth.authenticate(&query.token)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

/// Handle one authenticated WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: i64) {
    let connection_id = Uuid::new_v4();
    let max_message_size = state.settings.websocket.max_message_size;

    tracing::debug!(
        user_id = user_id,
        connection_id = %connection_id,
        "New WebSocket connection"
    );

    // Split socket for concurrent read/write
    let (mut sender, mut receiver) = socket.split();

    // Outbound frames flow through the registry channel
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.registry.register(user_id, connection_id, tx);

    // Forward frames from the channel to the socket
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound loop
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                state.registry.refresh(connection_id);

                if text.len() > max_message_size {
                    tracing::warn!(
                        user_id = user_id,
                        size = text.len(),
                        "Oversized frame dropped"
                    );
                    continue;
                }

                let event: ClientEvent = match serde_json::from_str(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        // Malformed payloads are dropped and logged, never
                        // fatal to the connection.
                        tracing::debug!(
                            user_id = user_id,
                            error = %e,
                            "Malformed event dropped"
                        );
                        continue;
                    }
                };

                if let Err(e) = state.dispatcher.dispatch(user_id, event).await {
                    match &e {
                        AppError::Validation(_) => {
                            tracing::debug!(user_id = user_id, error = %e, "Event dropped")
                        }
                        AppError::NotFound(_) | AppError::Forbidden(_) => {
                            tracing::info!(user_id = user_id, error = %e, "Event rejected")
                        }
                        _ => {
                            tracing::error!(user_id = user_id, error = %e, "Event failed")
                        }
                    }
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Pong replies are handled by axum; any traffic proves
                // liveness.
                state.registry.refresh(connection_id);
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    // Cleanup
    state.registry.unregister(connection_id);
    sender_task.abort();

    tracing::debug!(
        user_id = user_id,
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}

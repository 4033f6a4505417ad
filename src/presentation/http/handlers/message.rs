//! Message History Handler
//!
//! Paged conversation history, rendered per viewer at read time: translated
//! content comes from each message's cache with fallback to the original,
//! for-everyone deletions render as placeholders, and for-me deletions by
//! the viewer are omitted by the store.

use std::collections::HashMap;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::application::dto::{MessagePageResponse, MessageView, UserSnapshot};
use crate::domain::{ConversationDirectory, MessageStore, UserDirectory};
use crate::infrastructure::repositories::{PgConversationDirectory, PgMessageStore};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// History query parameters
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    /// Cursor: fetch messages older than this timestamp
    pub before: Option<i64>,
}

/// Get a page of conversation history
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagePageResponse>, AppError> {
    let conversation_id: i64 = conversation_id
        .parse()
        .map_err(|_| AppError::Validation("Invalid conversation ID".into()))?;

    let directory = PgConversationDirectory::new(state.db.clone(), state.snowflake.clone());
    if directory
        .record(conversation_id, auth.user_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("Conversation not found".into()));
    }

    let viewer = state
        .users
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let store = PgMessageStore::new(state.db.clone(), state.snowflake.clone());
    let page = store
        .list_page(
            conversation_id,
            auth.user_id,
            query.limit.unwrap_or(50),
            query.before,
        )
        .await?;

    // Resolve sender snapshots once per page
    let mut sender_ids: Vec<i64> = page.messages.iter().map(|m| m.sender_id).collect();
    sender_ids.sort_unstable();
    sender_ids.dedup();

    let senders: HashMap<i64, UserSnapshot> = state
        .users
        .find_many(&sender_ids)
        .await?
        .iter()
        .map(|user| (user.id, UserSnapshot::from(user)))
        .collect();

    let messages = page
        .messages
        .iter()
        .map(|message| {
            let sender = senders.get(&message.sender_id).cloned().unwrap_or_else(|| {
                UserSnapshot {
                    id: message.sender_id.to_string(),
                    username: "unknown".into(),
                    avatar_url: None,
                }
            });
            MessageView::render_for_language(message, &sender, &viewer.preferred_language)
        })
        .collect();

    Ok(Json(MessagePageResponse {
        messages,
        has_more: page.has_more,
        cursor: page.cursor,
    }))
}

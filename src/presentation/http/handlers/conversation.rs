//! Conversation Handlers
//!
//! Listing, creation and membership maintenance of conversations, all
//! answered from the visibility directory.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::application::dto::ConversationView;
use crate::domain::{ConversationDirectory, ConversationKind};
use crate::infrastructure::repositories::PgConversationDirectory;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Create conversation request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub participant_ids: Vec<String>,
}

/// Membership change request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantsRequest {
    pub participant_ids: Vec<String>,
}

/// Membership change response: the converged participant set
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsResponse {
    pub conversation_id: String,
    pub participant_ids: Vec<String>,
}

fn parse_ids(raw: &[String]) -> Result<Vec<i64>, AppError> {
    raw.iter()
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AppError::Validation(format!("Invalid user ID: {}", s)))
        })
        .collect()
}

fn directory(state: &AppState) -> Arc<PgConversationDirectory> {
    Arc::new(PgConversationDirectory::new(
        state.db.clone(),
        state.snowflake.clone(),
    ))
}

/// List the authenticated user's conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<ConversationView>>, AppError> {
    let records = directory(&state).records_for(auth.user_id).await?;
    Ok(Json(records.into_iter().map(ConversationView::from).collect()))
}

/// Create a conversation (or return the existing direct conversation for
/// the same pair)
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationView>), AppError> {
    let kind = match body.kind.as_str() {
        "direct" => ConversationKind::Direct,
        "group" => ConversationKind::Group,
        other => {
            return Err(AppError::Validation(format!(
                "Unknown conversation type: {}",
                other
            )))
        }
    };
    let participant_ids = parse_ids(&body.participant_ids)?;

    let record = directory(&state)
        .create_conversation(auth.user_id, kind, &participant_ids, body.name)
        .await?;

    Ok((StatusCode::CREATED, Json(ConversationView::from(record))))
}

/// Add participants to a group conversation
pub async fn add_participants(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
    Json(body): Json<AddParticipantsRequest>,
) -> Result<Json<ParticipantsResponse>, AppError> {
    let conversation_id: i64 = conversation_id
        .parse()
        .map_err(|_| AppError::Validation("Invalid conversation ID".into()))?;
    let new_ids = parse_ids(&body.participant_ids)?;

    let directory = directory(&state);
    ensure_member(directory.as_ref(), conversation_id, auth.user_id).await?;

    let participant_ids = directory.add_participants(conversation_id, &new_ids).await?;

    Ok(Json(ParticipantsResponse {
        conversation_id: conversation_id.to_string(),
        participant_ids: participant_ids.iter().map(|id| id.to_string()).collect(),
    }))
}

/// Remove a participant from a group conversation
pub async fn remove_participant(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((conversation_id, user_id)): Path<(String, String)>,
) -> Result<Json<ParticipantsResponse>, AppError> {
    let conversation_id: i64 = conversation_id
        .parse()
        .map_err(|_| AppError::Validation("Invalid conversation ID".into()))?;
    let target_id: i64 = user_id
        .parse()
        .map_err(|_| AppError::Validation("Invalid user ID".into()))?;

    let directory = directory(&state);
    ensure_member(directory.as_ref(), conversation_id, auth.user_id).await?;

    let participant_ids = directory
        .remove_participant(conversation_id, target_id)
        .await?;

    Ok(Json(ParticipantsResponse {
        conversation_id: conversation_id.to_string(),
        participant_ids: participant_ids.iter().map(|id| id.to_string()).collect(),
    }))
}

async fn ensure_member(
    directory: &PgConversationDirectory,
    conversation_id: i64,
    user_id: i64,
) -> Result<(), AppError> {
    let participants = directory.participants(conversation_id).await?;
    if !participants.contains(&user_id) {
        return Err(AppError::Forbidden(
            "Not a participant of this conversation".into(),
        ));
    }
    Ok(())
}

//! Outbound Events and View Models
//!
//! Everything a client receives: the outbound event envelope mirrored on
//! the inbound tagged union, plus the per-viewer message rendering shared
//! by the realtime channel and the HTTP history endpoint.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::domain::{
    Attachment, LastMessage, Message, MessageKind, MessageStatus, ReplyPreview, User,
    VisibilityRecord, DELETED_PLACEHOLDER,
};
use crate::shared::error::AppError;

/// Outbound event envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "message:receive")]
    MessageReceive(MessageView),

    #[serde(rename = "message:typing")]
    MessageTyping(TypingBroadcast),

    #[serde(rename = "message:reaction")]
    MessageReaction(ReactionBroadcast),

    #[serde(rename = "message:read")]
    MessageRead(ReadBroadcast),

    #[serde(rename = "message:deleted")]
    MessageDeleted(DeletedBroadcast),
}

impl ServerEvent {
    /// Serialize into the frame handed to connection writers.
    pub fn to_frame(&self) -> Result<String, AppError> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Internal(format!("Failed to serialize event: {}", e)))
    }
}

/// Sender snapshot embedded in delivered messages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl From<&User> for UserSnapshot {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// Per-viewer rendering of one message.
///
/// Carries the canonical fields plus the viewer-specific translation pair.
/// Used both as the `message:receive` payload and as the history page item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub conversation_id: String,
    pub timestamp: i64,
    pub created_at: String,
    pub sender: UserSnapshot,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub original_language: String,
    pub translated_content: String,
    pub target_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyPreview>,
    pub reactions: BTreeMap<String, BTreeSet<i64>>,
    pub read_by: Vec<i64>,
    pub status: MessageStatus,
}

impl MessageView {
    /// Render a message for one viewer with an already-resolved translation.
    ///
    /// For-everyone deletions render as the fixed placeholder for every
    /// participant, regardless of viewer language.
    pub fn render(
        message: &Message,
        sender: &UserSnapshot,
        target_language: &str,
        translated_content: &str,
    ) -> Self {
        if message.deleted_for_everyone {
            let view = message.deleted_view();
            let placeholder = view.content.clone();
            return Self::from_parts(&view, sender, target_language, placeholder);
        }
        Self::from_parts(
            message,
            sender,
            target_language,
            translated_content.to_string(),
        )
    }

    /// Render for a viewer using the message's translation cache, falling
    /// back to the original content. Used at read time for history pages.
    pub fn render_for_language(
        message: &Message,
        sender: &UserSnapshot,
        viewer_language: &str,
    ) -> Self {
        let translated = message.translated_for(viewer_language).to_string();
        Self::render(message, sender, viewer_language, &translated)
    }

    fn from_parts(
        message: &Message,
        sender: &UserSnapshot,
        target_language: &str,
        translated_content: String,
    ) -> Self {
        Self {
            id: message.id.to_string(),
            conversation_id: message.conversation_id.to_string(),
            timestamp: message.timestamp,
            created_at: message.created_at.to_rfc3339(),
            sender: sender.clone(),
            kind: message.kind,
            content: message.content.clone(),
            original_language: message.original_language.clone(),
            translated_content,
            target_language: target_language.to_string(),
            attachment: message.attachment.clone(),
            reply_to: message.reply_to.clone(),
            reactions: message.reactions.clone(),
            read_by: message.read_by.clone(),
            status: message.status,
        }
    }
}

/// `message:typing` broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingBroadcast {
    pub conversation_id: String,
    pub user_id: String,
    pub typing: bool,
}

/// `message:reaction` broadcast: always the full resulting map so one
/// dropped event cannot desync a client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionBroadcast {
    pub conversation_id: String,
    pub timestamp: i64,
    pub reactions: BTreeMap<String, BTreeSet<i64>>,
}

/// `message:read` broadcast, delivered to the original sender only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadBroadcast {
    pub conversation_id: String,
    pub timestamp: i64,
    pub reader_id: String,
}

/// `message:deleted` broadcast, only for for-everyone deletions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedBroadcast {
    pub conversation_id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
}

impl DeletedBroadcast {
    pub fn from_message(message: &Message) -> Self {
        Self {
            conversation_id: message.conversation_id.to_string(),
            timestamp: message.timestamp,
            kind: MessageKind::Deleted,
            content: DELETED_PLACEHOLDER.to_string(),
        }
    }
}

/// One conversation in the "list my conversations" response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub conversation_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub participant_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    pub unread_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<String>,
    pub updated_at: String,
}

impl From<VisibilityRecord> for ConversationView {
    fn from(record: VisibilityRecord) -> Self {
        Self {
            conversation_id: record.conversation_id.to_string(),
            kind: record.kind.as_str().to_string(),
            name: record.name,
            participant_ids: record
                .participant_ids
                .iter()
                .map(|id| id.to_string())
                .collect(),
            last_message: record.last_message,
            unread_count: record.unread_count,
            last_read_at: record.last_read_at.map(|t| t.to_rfc3339()),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

/// One page of history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePageResponse {
    pub messages: Vec<MessageView>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample_message() -> Message {
        Message {
            id: 5,
            conversation_id: 2,
            timestamp: 500,
            sender_id: 1,
            kind: MessageKind::Text,
            content: "Hello".into(),
            original_language: "en".into(),
            translations: HashMap::from([("es".to_string(), "Hola".to_string())]),
            attachment: None,
            reply_to: None,
            reactions: BTreeMap::new(),
            read_by: vec![],
            status: MessageStatus::Sent,
            deleted_by: vec![],
            deleted_for_everyone: false,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    fn snapshot() -> UserSnapshot {
        UserSnapshot {
            id: "1".into(),
            username: "ana".into(),
            avatar_url: None,
        }
    }

    #[test]
    fn test_render_for_language_uses_cache() {
        let view = MessageView::render_for_language(&sample_message(), &snapshot(), "es");
        assert_eq!(view.translated_content, "Hola");
        assert_eq!(view.target_language, "es");
        assert_eq!(view.content, "Hello");
    }

    #[test]
    fn test_render_for_language_falls_back() {
        let view = MessageView::render_for_language(&sample_message(), &snapshot(), "fr");
        assert_eq!(view.translated_content, "Hello");
        assert_eq!(view.target_language, "fr");
    }

    #[test]
    fn test_deleted_message_renders_placeholder() {
        let mut message = sample_message();
        message.deleted_for_everyone = true;
        message.deleted_at = Some(Utc::now());

        let view = MessageView::render_for_language(&message, &snapshot(), "es");
        assert_eq!(view.kind, MessageKind::Deleted);
        assert_eq!(view.content, DELETED_PLACEHOLDER);
        assert_eq!(view.translated_content, DELETED_PLACEHOLDER);
        assert!(view.attachment.is_none());
    }

    #[test]
    fn test_wire_action_names() {
        let event = ServerEvent::MessageTyping(TypingBroadcast {
            conversation_id: "2".into(),
            user_id: "1".into(),
            typing: true,
        });
        let frame = event.to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["action"], "message:typing");
        assert_eq!(value["data"]["typing"], true);
    }
}

//! Inbound Realtime Events
//!
//! The realtime channel carries `{action, data}` envelopes. Each action is a
//! variant of one tagged union with its own validated payload, dispatched
//! via an exhaustive match; unknown actions and missing fields fail at
//! deserialization instead of deep inside a handler.

use serde::Deserialize;
use validator::Validate;

use crate::domain::{Attachment, MessageKind, ReplyPreview};

/// Inbound event envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "message:send")]
    MessageSend(SendPayload),

    #[serde(rename = "message:typing")]
    MessageTyping(TypingPayload),

    #[serde(rename = "message:reaction")]
    MessageReaction(ReactionPayload),

    #[serde(rename = "message:read")]
    MessageRead(ReadPayload),

    #[serde(rename = "message:deleted")]
    MessageDeleted(DeletePayload),
}

impl ClientEvent {
    /// Wire action name, used for logging and metrics.
    pub fn action(&self) -> &'static str {
        match self {
            ClientEvent::MessageSend(_) => "message:send",
            ClientEvent::MessageTyping(_) => "message:typing",
            ClientEvent::MessageReaction(_) => "message:reaction",
            ClientEvent::MessageRead(_) => "message:read",
            ClientEvent::MessageDeleted(_) => "message:deleted",
        }
    }
}

/// `message:send` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub conversation_id: i64,

    /// May be empty for non-text kinds
    #[serde(default)]
    pub content: String,

    #[serde(rename = "type", default)]
    pub kind: MessageKind,

    #[serde(default)]
    pub attachment: Option<AttachmentPayload>,

    #[serde(default)]
    pub reply_to: Option<ReplyToPayload>,

    /// Opt into the long-form document translation path
    #[serde(default)]
    pub translate_document: bool,
}

/// Attachment reference carried on a send.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    #[validate(length(min = 1, max = 128))]
    pub id: String,

    #[validate(length(min = 1, max = 512))]
    pub key: String,

    #[validate(length(min = 1, max = 255))]
    pub file_name: String,

    #[validate(length(min = 1, max = 128))]
    pub content_type: String,

    #[validate(range(min = 1))]
    pub file_size: i64,

    #[validate(length(min = 1, max = 64))]
    pub category: String,
}

impl AttachmentPayload {
    pub fn into_attachment(self) -> Attachment {
        Attachment {
            id: self.id,
            key: self.key,
            file_name: self.file_name,
            content_type: self.content_type,
            file_size: self.file_size,
            category: self.category,
        }
    }
}

/// Reply reference carried on a send.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplyToPayload {
    pub message_id: i64,

    #[validate(length(max = 100))]
    pub content: String,

    pub sender_id: i64,

    #[validate(length(min = 1, max = 64))]
    pub sender_name: String,

    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}

impl ReplyToPayload {
    /// Convert into the stored preview, re-truncating defensively.
    pub fn into_preview(self) -> ReplyPreview {
        ReplyPreview::new(
            self.message_id,
            &self.content,
            self.sender_id,
            self.sender_name,
            self.kind,
        )
    }
}

/// `message:typing` payload. Ephemeral, never persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: i64,

    #[serde(default)]
    pub typing: bool,
}

/// `message:reaction` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReactionPayload {
    pub conversation_id: i64,

    /// Ordering key of the target message
    pub timestamp: i64,

    #[validate(length(min = 1, max = 32))]
    pub emoji: String,
}

/// `message:read` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPayload {
    pub conversation_id: i64,
    pub timestamp: i64,
}

/// `message:deleted` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePayload {
    pub conversation_id: i64,
    pub timestamp: i64,

    #[serde(default)]
    pub for_everyone: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_send() {
        let json = r#"{
            "action": "message:send",
            "data": {
                "conversationId": 12,
                "content": "hola",
                "type": "text"
            }
        }"#;

        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::MessageSend(p) => {
                assert_eq!(p.conversation_id, 12);
                assert_eq!(p.content, "hola");
                assert_eq!(p.kind, MessageKind::Text);
                assert!(!p.translate_document);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_message_reaction() {
        let json = r#"{
            "action": "message:reaction",
            "data": {"conversationId": 3, "timestamp": 99, "emoji": "🔥"}
        }"#;

        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.action(), "message:reaction");
    }

    #[test]
    fn test_parse_delete_defaults_to_for_me() {
        let json = r#"{
            "action": "message:deleted",
            "data": {"conversationId": 3, "timestamp": 99}
        }"#;

        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::MessageDeleted(p) => assert!(!p.for_everyone),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let json = r#"{"action": "message:edit", "data": {}}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let json = r#"{"action": "message:read", "data": {"conversationId": 3}}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_attachment_validation() {
        let payload = AttachmentPayload {
            id: "a1".into(),
            key: String::new(), // malformed: empty key
            file_name: "doc.pdf".into(),
            content_type: "application/pdf".into(),
            file_size: 1024,
            category: "document".into(),
        };
        assert!(payload.validate().is_err());
    }
}

//! Notification Fallback
//!
//! After fan-out, participants without a single live connection get a push
//! notification instead. Push failures are logged and swallowed; a push
//! never fails or blocks the send that triggered it.

use std::sync::Arc;

use serde_json::json;

use crate::domain::{truncate_chars, Message, MessageKind, PushMessage, PushProvider};
use crate::infrastructure::metrics;

/// Maximum characters of text preview in a push body.
pub const PUSH_BODY_MAX_CHARS: usize = 120;

/// Offline-recipient push fallback.
pub struct NotificationFallback<P> {
    provider: Arc<P>,
    /// Push even when the recipient has live connections. A named config
    /// option intended for debugging delivery issues.
    always_push: bool,
}

/// Type-appropriate push body: a truncated preview for text, a generic
/// kind label for everything else.
pub fn render_push_body(message: &Message) -> String {
    match message.kind {
        MessageKind::Text => truncate_chars(&message.content, PUSH_BODY_MAX_CHARS),
        kind => kind.push_label(),
    }
}

impl<P: PushProvider> NotificationFallback<P> {
    pub fn new(provider: Arc<P>, always_push: bool) -> Self {
        Self {
            provider,
            always_push,
        }
    }

    /// Notify one recipient if they had no live delivery.
    pub async fn notify(
        &self,
        recipient_id: i64,
        sender_name: &str,
        message: &Message,
        had_live_delivery: bool,
    ) {
        if had_live_delivery && !self.always_push {
            return;
        }

        let push = PushMessage {
            user_id: recipient_id,
            title: sender_name.to_string(),
            body: render_push_body(message),
            data: json!({
                "conversationId": message.conversation_id.to_string(),
                "timestamp": message.timestamp,
            }),
        };

        match self.provider.push(push).await {
            Ok(()) => metrics::record_push_fallback("sent"),
            Err(e) => {
                metrics::record_push_fallback("failed");
                tracing::warn!(
                    recipient_id = recipient_id,
                    error = %e,
                    "Push fallback failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, HashMap};

    use crate::domain::MessageStatus;

    fn message(kind: MessageKind, content: &str) -> Message {
        Message {
            id: 1,
            conversation_id: 2,
            timestamp: 3,
            sender_id: 4,
            kind,
            content: content.into(),
            original_language: "en".into(),
            translations: HashMap::new(),
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

    #[test]
    fn test_text_body_is_truncated_preview() {
        let long = "y".repeat(500);
        let body = render_push_body(&message(MessageKind::Text, &long));
        assert_eq!(body.chars().count(), PUSH_BODY_MAX_CHARS);
    }

    #[test]
    fn test_short_text_body_is_untouched() {
        let body = render_push_body(&message(MessageKind::Text, "see you at 8"));
        assert_eq!(body, "see you at 8");
    }

    #[test]
    fn test_non_text_body_is_kind_label() {
        let body = render_push_body(&message(MessageKind::Voice, ""));
        assert_eq!(body, "(voice) message");
    }
}

//! Message entity and store trait.
//!
//! Maps to the `messages` table. The ordering key within a conversation is
//! the message's millisecond timestamp; the snowflake id is the identity.
//! Reaction, read-receipt and soft-delete state live on the message itself,
//! so the mutation rules are entity methods shared by every store backend.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Fixed placeholder shown for messages deleted for everyone.
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

/// Maximum characters kept in a reply preview.
pub const REPLY_PREVIEW_MAX_CHARS: usize = 100;

/// Message content kinds carried over the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A plain text message, the only short-text translatable kind
    #[default]
    Text,
    Image,
    Gif,
    /// A file attachment; translatable only via the opt-in document path
    File,
    Video,
    Audio,
    Voice,
    /// Rendered form of a message deleted for everyone
    Deleted,
}

impl MessageKind {
    /// Convert from the wire/database string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "gif" => Self::Gif,
            "file" => Self::File,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "voice" => Self::Voice,
            "deleted" => Self::Deleted,
            _ => Self::Text,
        }
    }

    /// Convert to the wire/database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Gif => "gif",
            Self::File => "file",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Deleted => "deleted",
        }
    }

    /// Translation-exempt kinds always deliver the original content.
    pub fn is_translation_exempt(&self) -> bool {
        !matches!(self, Self::Text | Self::File)
    }

    /// Label used for push-notification bodies of non-text messages.
    pub fn push_label(&self) -> String {
        format!("({}) message", self.as_str())
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
}

impl MessageStatus {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "delivered" => Self::Delivered,
            _ => Self::Sent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
        }
    }
}

/// Reference to an object in the attachment store, bound to one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    /// Object key inside the attachment store
    pub key: String,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub category: String,
}

/// Denormalized preview of the message being replied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub message_id: i64,
    /// Truncated to [`REPLY_PREVIEW_MAX_CHARS`] characters
    pub content: String,
    pub sender_id: i64,
    pub sender_name: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl ReplyPreview {
    /// Build a preview, truncating content on a character boundary.
    pub fn new(
        message_id: i64,
        content: &str,
        sender_id: i64,
        sender_name: String,
        kind: MessageKind,
    ) -> Self {
        Self {
            message_id,
            content: truncate_chars(content, REPLY_PREVIEW_MAX_CHARS),
            sender_id,
            sender_name,
            kind,
        }
    }
}

/// Truncate a string to at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// A message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Snowflake identity
    pub id: i64,

    pub conversation_id: i64,

    /// Millisecond timestamp, the ordering key within the conversation
    pub timestamp: i64,

    pub sender_id: i64,

    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Canonical content in the sender's language
    pub content: String,

    /// Language detected once at send time
    pub original_language: String,

    /// Cached translations by target language code. A (message, language)
    /// pair is translated at most once; history falls back to `content`.
    pub translations: HashMap<String, String>,

    pub attachment: Option<Attachment>,

    pub reply_to: Option<ReplyPreview>,

    /// Reactions by emoji. An emoji key never holds an empty set.
    pub reactions: BTreeMap<String, BTreeSet<i64>>,

    /// Users that have read the message (no duplicates)
    pub read_by: Vec<i64>,

    pub status: MessageStatus,

    /// Users that deleted the message for themselves only
    pub deleted_by: Vec<i64>,

    pub deleted_for_everyone: bool,

    pub deleted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Resolve the content a viewer in `language` should see.
    ///
    /// Translation-exempt kinds and same-language viewers get the original;
    /// otherwise the cached translation, falling back to the original when
    /// no cache entry exists for that language.
    pub fn translated_for(&self, language: &str) -> &str {
        if self.kind.is_translation_exempt() || language == self.original_language {
            return &self.content;
        }
        self.translations
            .get(language)
            .map(String::as_str)
            .unwrap_or(&self.content)
    }

    /// Whether this message is hidden from `viewer_id` ("delete for me").
    pub fn is_hidden_for(&self, viewer_id: i64) -> bool {
        self.deleted_by.contains(&viewer_id)
    }

    /// Toggle `user_id`'s reaction with `emoji`.
    ///
    /// Returns true when the reaction is present after the toggle. The emoji
    /// key is dropped when its set becomes empty.
    pub fn toggle_reaction(&mut self, user_id: i64, emoji: &str) -> bool {
        let users = self.reactions.entry(emoji.to_string()).or_default();
        let added = if users.contains(&user_id) {
            users.remove(&user_id);
            false
        } else {
            users.insert(user_id);
            true
        };
        if self.reactions.get(emoji).is_some_and(|u| u.is_empty()) {
            self.reactions.remove(emoji);
        }
        added
    }

    /// Record `user_id` in `read_by`. Returns false when already present.
    pub fn mark_read(&mut self, user_id: i64) -> bool {
        if self.read_by.contains(&user_id) {
            return false;
        }
        self.read_by.push(user_id);
        true
    }

    /// Apply a soft delete.
    ///
    /// `for_everyone` requires the requester to be the sender and is
    /// rejected before any mutation otherwise. A for-me delete appends the
    /// requester to `deleted_by`; the message stays visible to everyone else.
    pub fn soft_delete(
        &mut self,
        requester_id: i64,
        for_everyone: bool,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if for_everyone {
            if requester_id != self.sender_id {
                return Err(AppError::Forbidden(
                    "Only the sender can delete a message for everyone".into(),
                ));
            }
            self.deleted_for_everyone = true;
            self.deleted_at = Some(now);
        } else if !self.deleted_by.contains(&requester_id) {
            self.deleted_by.push(requester_id);
        }
        Ok(())
    }

    /// The rendering of a message deleted for everyone: fixed placeholder,
    /// `deleted` kind, no attachment, reply preview or reactions.
    pub fn deleted_view(&self) -> Message {
        Message {
            kind: MessageKind::Deleted,
            content: DELETED_PLACEHOLDER.to_string(),
            translations: HashMap::new(),
            attachment: None,
            reply_to: None,
            reactions: BTreeMap::new(),
            ..self.clone()
        }
    }
}

/// Draft message accepted by [`MessageStore::append`], which assigns the
/// identity and ordering key.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender_id: i64,
    pub kind: MessageKind,
    pub content: String,
    pub original_language: String,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<ReplyPreview>,
}

/// One page of conversation history.
///
/// Messages are fetched newest-first and returned chronologically;
/// `cursor` is the timestamp of the oldest returned row.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub cursor: Option<i64>,
}

/// Store trait for the append-mostly ordered message log.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Assign id + timestamp and persist the draft.
    async fn append(&self, draft: NewMessage) -> Result<Message, AppError>;

    /// Fetch one message by its conversation and ordering key.
    async fn get(&self, conversation_id: i64, timestamp: i64) -> Result<Option<Message>, AppError>;

    /// Page through history for `viewer_id`.
    ///
    /// Messages the viewer deleted for themselves are omitted; `has_more` is
    /// true iff more than `limit` rows were fetched.
    async fn list_page(
        &self,
        conversation_id: i64,
        viewer_id: i64,
        limit: i64,
        before: Option<i64>,
    ) -> Result<MessagePage, AppError>;

    /// Toggle a reaction and return the updated message.
    async fn toggle_reaction(
        &self,
        conversation_id: i64,
        timestamp: i64,
        user_id: i64,
        emoji: &str,
    ) -> Result<Message, AppError>;

    /// Idempotently record a read receipt. Returns true when newly added.
    async fn mark_read(
        &self,
        conversation_id: i64,
        timestamp: i64,
        user_id: i64,
    ) -> Result<bool, AppError>;

    /// Soft-delete for the requester or (sender-only) for everyone.
    async fn soft_delete(
        &self,
        conversation_id: i64,
        timestamp: i64,
        requester_id: i64,
        for_everyone: bool,
    ) -> Result<Message, AppError>;

    /// Field-level merge of computed translations into the message's cache.
    /// Never overwrites the whole map.
    async fn cache_translations(
        &self,
        conversation_id: i64,
        timestamp: i64,
        entries: &HashMap<String, String>,
    ) -> Result<(), AppError>;
}

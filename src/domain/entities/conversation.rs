//! Conversation visibility records and directory trait.
//!
//! A conversation is stored as one denormalized `VisibilityRecord` per
//! participant, which makes "list my conversations" a single indexed read.
//! All records sharing a conversation id carry the same `participant_ids`
//! list; the directory rewrites every copy inside one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{Message, MessageKind};
use crate::shared::error::AppError;

/// Minimum participants a group conversation must retain.
pub const MIN_GROUP_PARTICIPANTS: usize = 2;

/// Conversation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "group" => Self::Group,
            _ => Self::Direct,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical (untranslated) snapshot of the latest message, copied onto
/// every participant's record after each send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub timestamp: i64,
    pub sender_id: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            timestamp: message.timestamp,
            sender_id: message.sender_id,
            kind: message.kind,
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

/// One participant's denormalized view of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityRecord {
    pub conversation_id: i64,
    pub participant_id: i64,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub participant_ids: Vec<i64>,
    pub last_message: Option<LastMessage>,
    pub unread_count: i32,
    pub last_read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize a direct-conversation pair so (a, b) and (b, a) are the same
/// lookup key.
pub fn normalize_direct_pair(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Validate a conversation creation request.
///
/// Direct conversations take exactly two distinct participants; groups take
/// at least [`MIN_GROUP_PARTICIPANTS`] distinct participants.
pub fn validate_new_conversation(
    kind: ConversationKind,
    participant_ids: &[i64],
) -> Result<(), AppError> {
    let mut distinct = participant_ids.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    match kind {
        ConversationKind::Direct if distinct.len() != 2 => Err(AppError::Validation(
            "A direct conversation requires exactly two distinct participants".into(),
        )),
        ConversationKind::Group if distinct.len() < MIN_GROUP_PARTICIPANTS => {
            Err(AppError::Validation(format!(
                "A group conversation requires at least {} participants",
                MIN_GROUP_PARTICIPANTS
            )))
        }
        _ => Ok(()),
    }
}

/// Validate a participant removal before any mutation happens.
pub fn validate_removal(
    kind: ConversationKind,
    current: &[i64],
    target_id: i64,
) -> Result<(), AppError> {
    if kind != ConversationKind::Group {
        return Err(AppError::Forbidden(
            "Participants can only be removed from group conversations".into(),
        ));
    }
    if !current.contains(&target_id) {
        return Err(AppError::NotFound(format!(
            "User {} is not a participant",
            target_id
        )));
    }
    if current.len() - 1 < MIN_GROUP_PARTICIPANTS {
        return Err(AppError::Forbidden(format!(
            "A group conversation must retain at least {} participants",
            MIN_GROUP_PARTICIPANTS
        )));
    }
    Ok(())
}

/// Directory trait for per-participant conversation visibility.
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    /// All conversations visible to `user_id`, most recently updated first.
    /// Answered from visibility records alone, no message scan.
    async fn records_for(&self, user_id: i64) -> Result<Vec<VisibilityRecord>, AppError>;

    /// One participant's record, if the conversation is visible to them.
    async fn record(
        &self,
        conversation_id: i64,
        participant_id: i64,
    ) -> Result<Option<VisibilityRecord>, AppError>;

    /// Current participant set of a conversation.
    async fn participants(&self, conversation_id: i64) -> Result<Vec<i64>, AppError>;

    /// Create a conversation and one record per participant.
    ///
    /// For a direct conversation the unordered pair is looked up first and
    /// an existing conversation is returned instead of a duplicate. Returns
    /// the creator's record.
    async fn create_conversation(
        &self,
        creator_id: i64,
        kind: ConversationKind,
        participant_ids: &[i64],
        name: Option<String>,
    ) -> Result<VisibilityRecord, AppError>;

    /// Group-only: add participants, rewriting every existing record and
    /// creating fresh ones for the newcomers. Returns the updated set.
    async fn add_participants(
        &self,
        conversation_id: i64,
        new_ids: &[i64],
    ) -> Result<Vec<i64>, AppError>;

    /// Group-only: remove a participant. Rejected outright when the result
    /// would fall below [`MIN_GROUP_PARTICIPANTS`]. Returns the updated set.
    async fn remove_participant(
        &self,
        conversation_id: i64,
        target_id: i64,
    ) -> Result<Vec<i64>, AppError>;

    /// Copy the canonical message snapshot onto every participant's record,
    /// bump `updated_at`, and increment unread counts for non-senders.
    async fn touch_last_message(&self, message: &Message) -> Result<(), AppError>;

    /// Reset the reader's unread count and stamp `last_read_at`.
    async fn mark_read_through(
        &self,
        conversation_id: i64,
        participant_id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 2, (1, 2))]
    #[test_case(2, 1, (1, 2))]
    #[test_case(5, 5, (5, 5))]
    fn test_normalize_direct_pair(a: i64, b: i64, expected: (i64, i64)) {
        assert_eq!(normalize_direct_pair(a, b), expected);
    }

    #[test]
    fn test_direct_requires_exactly_two() {
        assert!(validate_new_conversation(ConversationKind::Direct, &[1, 2]).is_ok());
        assert!(validate_new_conversation(ConversationKind::Direct, &[1]).is_err());
        assert!(validate_new_conversation(ConversationKind::Direct, &[1, 2, 3]).is_err());
        // Duplicates collapse to one participant.
        assert!(validate_new_conversation(ConversationKind::Direct, &[1, 1]).is_err());
    }

    #[test]
    fn test_group_requires_minimum() {
        assert!(validate_new_conversation(ConversationKind::Group, &[1, 2]).is_ok());
        assert!(validate_new_conversation(ConversationKind::Group, &[1, 2, 3]).is_ok());
        assert!(validate_new_conversation(ConversationKind::Group, &[1]).is_err());
    }

    #[test]
    fn test_removal_rejected_for_direct() {
        let err = validate_removal(ConversationKind::Direct, &[1, 2], 2).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_removal_rejected_below_minimum() {
        let err = validate_removal(ConversationKind::Group, &[1, 2], 2).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert!(validate_removal(ConversationKind::Group, &[1, 2, 3], 2).is_ok());
    }

    #[test]
    fn test_removal_of_non_participant() {
        let err = validate_removal(ConversationKind::Group, &[1, 2, 3], 9).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

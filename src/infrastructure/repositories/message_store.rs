//! Message Store Implementation
//!
//! PostgreSQL implementation of the ordered per-conversation message log.
//! The ordering key is the snowflake's millisecond timestamp; pages are
//! fetched newest-first with keyset pagination and returned chronologically.
//!
//! Reaction toggles run as `SELECT ... FOR UPDATE` read-modify-writes so two
//! concurrent toggles on the same message serialize instead of racing; read
//! receipts use a single guarded `array_append` update, idempotent by
//! construction.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::{
    Attachment, Message, MessageKind, MessagePage, MessageStatus, MessageStore, NewMessage,
    ReplyPreview,
};
use crate::shared::error::AppError;
use crate::shared::snowflake::{extract_timestamp, SnowflakeGenerator};

/// Columns selected for every message query.
const MESSAGE_COLUMNS: &str = r#"
    id, conversation_id, ts, sender_id, kind, content, original_language,
    translations, attachment, reply_to, reactions, read_by, status,
    deleted_by, deleted_for_everyone, deleted_at, created_at
"#;

/// PostgreSQL message store.
pub struct PgMessageStore {
    pool: PgPool,
    ids: Arc<SnowflakeGenerator>,
}

impl PgMessageStore {
    /// Creates a new PgMessageStore with the given connection pool.
    pub fn new(pool: PgPool, ids: Arc<SnowflakeGenerator>) -> Self {
        Self { pool, ids }
    }
}

/// Internal row type for message queries.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: i64,
    ts: i64,
    sender_id: i64,
    kind: String,
    content: String,
    original_language: String,
    translations: Json<HashMap<String, String>>,
    attachment: Option<Json<Attachment>>,
    reply_to: Option<Json<ReplyPreview>>,
    reactions: Json<BTreeMap<String, BTreeSet<i64>>>,
    read_by: Vec<i64>,
    status: String,
    deleted_by: Vec<i64>,
    deleted_for_everyone: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    /// Converts database row to the domain Message entity.
    fn into_message(self) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            timestamp: self.ts,
            sender_id: self.sender_id,
            kind: MessageKind::from_str(&self.kind),
            content: self.content,
            original_language: self.original_language,
            translations: self.translations.0,
            attachment: self.attachment.map(|j| j.0),
            reply_to: self.reply_to.map(|j| j.0),
            reactions: self.reactions.0,
            read_by: self.read_by,
            status: MessageStatus::from_str(&self.status),
            deleted_by: self.deleted_by,
            deleted_for_everyone: self.deleted_for_everyone,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    /// Assign id + ordering key and persist the draft.
    ///
    /// The ordering key is the snowflake's millisecond timestamp; on the
    /// rare same-millisecond collision within a conversation the key is
    /// bumped by one and the insert retried.
    async fn append(&self, draft: NewMessage) -> Result<Message, AppError> {
        let id = self.ids.generate();
        let mut ts = extract_timestamp(id);

        for _ in 0..3 {
            let result = sqlx::query_as::<_, MessageRow>(&format!(
                r#"
                INSERT INTO messages
                    (id, conversation_id, ts, sender_id, kind, content,
                     original_language, attachment, reply_to)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING {MESSAGE_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(draft.conversation_id)
            .bind(ts)
            .bind(draft.sender_id)
            .bind(draft.kind.as_str())
            .bind(&draft.content)
            .bind(&draft.original_language)
            .bind(draft.attachment.as_ref().map(Json))
            .bind(draft.reply_to.as_ref().map(Json))
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(row) => return Ok(row.into_message()),
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    ts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "Could not assign an ordering key in conversation {}",
            draft.conversation_id
        )))
    }

    async fn get(&self, conversation_id: i64, timestamp: i64) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1 AND ts = $2
            "#
        ))
        .bind(conversation_id)
        .bind(timestamp)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_message()))
    }

    /// Page through history for one viewer.
    ///
    /// Rows are fetched newest-first; one extra row decides `has_more`. The
    /// page is reversed to chronological order and the cursor is the oldest
    /// returned timestamp. Messages the viewer deleted for themselves never
    /// appear; for-everyone deletions are returned as stored and rendered as
    /// placeholders by the caller.
    async fn list_page(
        &self,
        conversation_id: i64,
        viewer_id: i64,
        limit: i64,
        before: Option<i64>,
    ) -> Result<MessagePage, AppError> {
        let limit = limit.clamp(1, 100);

        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1
              AND NOT (deleted_by @> ARRAY[$2]::BIGINT[])
              AND ($3::BIGINT IS NULL OR ts < $3)
            ORDER BY ts DESC
            LIMIT $4
            "#
        ))
        .bind(conversation_id)
        .bind(viewer_id)
        .bind(before)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as i64 > limit;
        let mut messages: Vec<Message> = rows
            .into_iter()
            .take(limit as usize)
            .map(|r| r.into_message())
            .collect();
        messages.reverse();

        let cursor = messages.first().map(|m| m.timestamp);
        Ok(MessagePage {
            messages,
            has_more,
            cursor,
        })
    }

    /// Toggle a reaction under a row lock and return the updated message.
    async fn toggle_reaction(
        &self,
        conversation_id: i64,
        timestamp: i64,
        user_id: i64,
        emoji: &str,
    ) -> Result<Message, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1 AND ts = $2
            FOR UPDATE
            "#
        ))
        .bind(conversation_id)
        .bind(timestamp)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Message {} not found", timestamp)))?;

        let mut message = row.into_message();
        message.toggle_reaction(user_id, emoji);

        sqlx::query(
            r#"
            UPDATE messages SET reactions = $3
            WHERE conversation_id = $1 AND ts = $2
            "#,
        )
        .bind(conversation_id)
        .bind(timestamp)
        .bind(Json(&message.reactions))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    /// Guarded set-union insert; repeats are no-ops.
    async fn mark_read(
        &self,
        conversation_id: i64,
        timestamp: i64,
        user_id: i64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET read_by = array_append(read_by, $3)
            WHERE conversation_id = $1 AND ts = $2
              AND NOT (read_by @> ARRAY[$3]::BIGINT[])
            "#,
        )
        .bind(conversation_id)
        .bind(timestamp)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Distinguish "already read" from "no such message".
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE conversation_id = $1 AND ts = $2)",
        )
        .bind(conversation_id)
        .bind(timestamp)
        .fetch_one(&self.pool)
        .await?;

        if !exists {
            return Err(AppError::NotFound(format!(
                "Message {} not found",
                timestamp
            )));
        }
        Ok(false)
    }

    async fn soft_delete(
        &self,
        conversation_id: i64,
        timestamp: i64,
        requester_id: i64,
        for_everyone: bool,
    ) -> Result<Message, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1 AND ts = $2
            FOR UPDATE
            "#
        ))
        .bind(conversation_id)
        .bind(timestamp)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Message {} not found", timestamp)))?;

        let mut message = row.into_message();
        message.soft_delete(requester_id, for_everyone, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE messages
            SET deleted_by = $3, deleted_for_everyone = $4, deleted_at = $5
            WHERE conversation_id = $1 AND ts = $2
            "#,
        )
        .bind(conversation_id)
        .bind(timestamp)
        .bind(&message.deleted_by)
        .bind(message.deleted_for_everyone)
        .bind(message.deleted_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    /// Merge computed translations into the cache, key by key. `||` on
    /// jsonb adds/replaces only the given keys, so concurrent senders with
    /// different target languages never clobber each other's entries.
    async fn cache_translations(
        &self,
        conversation_id: i64,
        timestamp: i64,
        entries: &HashMap<String, String>,
    ) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE messages SET translations = translations || $3
            WHERE conversation_id = $1 AND ts = $2
            "#,
        )
        .bind(conversation_id)
        .bind(timestamp)
        .bind(Json(entries))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion() {
        let row = MessageRow {
            id: 9,
            conversation_id: 3,
            ts: 1_000,
            sender_id: 4,
            kind: "voice".into(),
            content: String::new(),
            original_language: "en".into(),
            translations: Json(HashMap::new()),
            attachment: None,
            reply_to: None,
            reactions: Json(BTreeMap::new()),
            read_by: vec![],
            status: "sent".into(),
            deleted_by: vec![],
            deleted_for_everyone: false,
            deleted_at: None,
            created_at: Utc::now(),
        };

        let message = row.into_message();
        assert_eq!(message.kind, MessageKind::Voice);
        assert_eq!(message.timestamp, 1_000);
        assert_eq!(message.status, MessageStatus::Sent);
    }
}

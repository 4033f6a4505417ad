//! Conversation Directory Implementation
//!
//! PostgreSQL implementation of per-participant visibility records. Every
//! multi-record rewrite (create, add, remove, last-message touch) happens in
//! one transaction, so all copies of `participant_ids` converge at each
//! commit point and readers never observe a partial fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::{
    validate_new_conversation, validate_removal, ConversationDirectory, ConversationKind,
    LastMessage, Message, VisibilityRecord,
};
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

/// Columns selected for every visibility query.
const RECORD_COLUMNS: &str = r#"
    conversation_id, participant_id, kind, name, participant_ids,
    last_message, unread_count, last_read_at, created_at, updated_at
"#;

/// PostgreSQL conversation directory.
pub struct PgConversationDirectory {
    pool: PgPool,
    ids: Arc<SnowflakeGenerator>,
}

impl PgConversationDirectory {
    /// Creates a new PgConversationDirectory with the given connection pool.
    pub fn new(pool: PgPool, ids: Arc<SnowflakeGenerator>) -> Self {
        Self { pool, ids }
    }

    /// Look up an existing direct conversation between an unordered pair.
    async fn find_direct_between(
        &self,
        a: i64,
        b: i64,
    ) -> Result<Option<VisibilityRecord>, AppError> {
        let row = sqlx::query_as::<_, VisibilityRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM conversation_visibility
            WHERE participant_id = $1
              AND kind = 'direct'
              AND participant_ids @> ARRAY[$2]::BIGINT[]
              AND cardinality(participant_ids) = 2
            LIMIT 1
            "#
        ))
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_record()))
    }

    /// Lock every record of a conversation and return the shared metadata.
    async fn lock_conversation(
        tx: &mut sqlx::PgConnection,
        conversation_id: i64,
    ) -> Result<Vec<VisibilityRecord>, AppError> {
        let rows = sqlx::query_as::<_, VisibilityRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM conversation_visibility
            WHERE conversation_id = $1
            ORDER BY participant_id
            FOR UPDATE
            "#
        ))
        .bind(conversation_id)
        .fetch_all(tx)
        .await?;

        if rows.is_empty() {
            return Err(AppError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }
        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }
}

/// Internal row type for visibility queries.
#[derive(Debug, sqlx::FromRow)]
struct VisibilityRow {
    conversation_id: i64,
    participant_id: i64,
    kind: String,
    name: Option<String>,
    participant_ids: Vec<i64>,
    last_message: Option<Json<LastMessage>>,
    unread_count: i32,
    last_read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VisibilityRow {
    fn into_record(self) -> VisibilityRecord {
        VisibilityRecord {
            conversation_id: self.conversation_id,
            participant_id: self.participant_id,
            kind: ConversationKind::from_str(&self.kind),
            name: self.name,
            participant_ids: self.participant_ids,
            last_message: self.last_message.map(|j| j.0),
            unread_count: self.unread_count,
            last_read_at: self.last_read_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[async_trait]
impl ConversationDirectory for PgConversationDirectory {
    /// "List my conversations" straight off the participant index.
    async fn records_for(&self, user_id: i64) -> Result<Vec<VisibilityRecord>, AppError> {
        let rows = sqlx::query_as::<_, VisibilityRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM conversation_visibility
            WHERE participant_id = $1
            ORDER BY updated_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    async fn record(
        &self,
        conversation_id: i64,
        participant_id: i64,
    ) -> Result<Option<VisibilityRecord>, AppError> {
        let row = sqlx::query_as::<_, VisibilityRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM conversation_visibility
            WHERE conversation_id = $1 AND participant_id = $2
            "#
        ))
        .bind(conversation_id)
        .bind(participant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_record()))
    }

    async fn participants(&self, conversation_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Option<Vec<i64>> = sqlx::query_scalar(
            r#"
            SELECT participant_ids FROM conversation_visibility
            WHERE conversation_id = $1
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        ids.ok_or_else(|| {
            AppError::NotFound(format!("Conversation {} not found", conversation_id))
        })
    }

    async fn create_conversation(
        &self,
        creator_id: i64,
        kind: ConversationKind,
        participant_ids: &[i64],
        name: Option<String>,
    ) -> Result<VisibilityRecord, AppError> {
        validate_new_conversation(kind, participant_ids)?;

        let mut participants = participant_ids.to_vec();
        participants.sort_unstable();
        participants.dedup();

        if !participants.contains(&creator_id) {
            return Err(AppError::Forbidden(
                "The creator must be a participant".into(),
            ));
        }

        // At most one direct conversation per unordered pair.
        if kind == ConversationKind::Direct {
            let other = participants
                .iter()
                .copied()
                .find(|id| *id != creator_id)
                .unwrap_or(creator_id);
            if let Some(existing) = self.find_direct_between(creator_id, other).await? {
                return Ok(existing);
            }
        }

        let conversation_id = self.ids.generate();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        for participant_id in &participants {
            sqlx::query(
                r#"
                INSERT INTO conversation_visibility
                    (conversation_id, participant_id, kind, name, participant_ids,
                     created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $6)
                "#,
            )
            .bind(conversation_id)
            .bind(participant_id)
            .bind(kind.as_str())
            .bind(&name)
            .bind(&participants)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            conversation_id = conversation_id,
            kind = %kind,
            participants = participants.len(),
            "Conversation created"
        );

        Ok(VisibilityRecord {
            conversation_id,
            participant_id: creator_id,
            kind,
            name,
            participant_ids: participants,
            last_message: None,
            unread_count: 0,
            last_read_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn add_participants(
        &self,
        conversation_id: i64,
        new_ids: &[i64],
    ) -> Result<Vec<i64>, AppError> {
        let mut tx = self.pool.begin().await?;
        let records = Self::lock_conversation(&mut tx, conversation_id).await?;
        let head = &records[0];

        if head.kind != ConversationKind::Group {
            return Err(AppError::Forbidden(
                "Participants can only be added to group conversations".into(),
            ));
        }

        let mut merged = head.participant_ids.clone();
        let mut added = Vec::new();
        for id in new_ids {
            if !merged.contains(id) {
                merged.push(*id);
                added.push(*id);
            }
        }
        if added.is_empty() {
            tx.commit().await?;
            return Ok(merged);
        }
        merged.sort_unstable();

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE conversation_visibility
            SET participant_ids = $2, updated_at = $3
            WHERE conversation_id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(&merged)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for participant_id in &added {
            sqlx::query(
                r#"
                INSERT INTO conversation_visibility
                    (conversation_id, participant_id, kind, name, participant_ids,
                     created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $6)
                "#,
            )
            .bind(conversation_id)
            .bind(participant_id)
            .bind(head.kind.as_str())
            .bind(&head.name)
            .bind(&merged)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            conversation_id = conversation_id,
            added = added.len(),
            "Participants added"
        );
        Ok(merged)
    }

    async fn remove_participant(
        &self,
        conversation_id: i64,
        target_id: i64,
    ) -> Result<Vec<i64>, AppError> {
        let mut tx = self.pool.begin().await?;
        let records = Self::lock_conversation(&mut tx, conversation_id).await?;
        let head = &records[0];

        validate_removal(head.kind, &head.participant_ids, target_id)?;

        let remaining: Vec<i64> = head
            .participant_ids
            .iter()
            .copied()
            .filter(|id| *id != target_id)
            .collect();

        sqlx::query(
            r#"
            DELETE FROM conversation_visibility
            WHERE conversation_id = $1 AND participant_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(target_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversation_visibility
            SET participant_ids = $2, updated_at = $3
            WHERE conversation_id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(&remaining)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            conversation_id = conversation_id,
            target_id = target_id,
            "Participant removed"
        );
        Ok(remaining)
    }

    /// Copy the canonical (untranslated) snapshot onto every record and
    /// bump unread counts for everyone but the sender. One statement, so
    /// the rewrite is atomic.
    async fn touch_last_message(&self, message: &Message) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE conversation_visibility
            SET last_message = $2,
                updated_at = $3,
                unread_count = CASE
                    WHEN participant_id = $4 THEN unread_count
                    ELSE unread_count + 1
                END
            WHERE conversation_id = $1
            "#,
        )
        .bind(message.conversation_id)
        .bind(Json(LastMessage::from(message)))
        .bind(Utc::now())
        .bind(message.sender_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_read_through(
        &self,
        conversation_id: i64,
        participant_id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE conversation_visibility
            SET unread_count = 0, last_read_at = $3
            WHERE conversation_id = $1 AND participant_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(participant_id)
        .bind(read_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

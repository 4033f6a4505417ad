//! User Directory Implementation
//!
//! Read-only PostgreSQL lookups into the identity collaborator's `users`
//! table. This core never writes user rows.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{User, UserDirectory};
use crate::shared::error::AppError;

/// PostgreSQL user directory.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for user queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    preferred_language: String,
    preferred_country: Option<String>,
    preferred_region: Option<String>,
    avatar_url: Option<String>,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            preferred_language: self.preferred_language,
            preferred_country: self.preferred_country,
            preferred_region: self.preferred_region,
            avatar_url: self.avatar_url,
        }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, preferred_language, preferred_country,
                   preferred_region, avatar_url
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_user()))
    }

    async fn find_many(&self, ids: &[i64]) -> Result<Vec<User>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, preferred_language, preferred_country,
                   preferred_region, avatar_url
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_user()).collect())
    }
}

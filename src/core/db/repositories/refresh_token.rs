//! PostgreSQL refresh token repository
//!
//! Conditional writes are single `UPDATE ... WHERE revoked_at IS NULL` statements.
//! Under READ COMMITTED a second writer blocks on the row lock and re-evaluates the
//! predicate once the first commits, so only one of them ever matches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::core::db::models::RefreshToken;
use crate::core::db::store::{StoreError, TokenStore};

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, token_value, created_at, created_by_ip, expires_at,
           revoked_at, revoked_by_ip, replaced_by_token_value, deleted
    FROM refresh_tokens
"#;

const INSERT_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (
        id, user_id, token_value, created_at, created_by_ip, expires_at,
        revoked_at, revoked_by_ip, replaced_by_token_value, deleted
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

/// Refresh token repository for database operations
#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: PgPool,
}

impl RefreshTokenRepository {
    /// Create a new refresh token repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_in(
        tx: &mut Transaction<'_, Postgres>,
        token: &RefreshToken,
    ) -> Result<(), StoreError> {
        sqlx::query(INSERT_TOKEN)
            .bind(token.id)
            .bind(token.user_id)
            .bind(&token.token_value)
            .bind(token.created_at)
            .bind(&token.created_by_ip)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(&token.revoked_by_ip)
            .bind(&token.replaced_by_token_value)
            .bind(token.deleted)
            .execute(&mut **tx)
            .await
            .map_err(|err| write_error(err, token))?;

        Ok(())
    }
}

/// Unique violations on `token_value` or `id` become conflicts; everything else is I/O
fn write_error(err: sqlx::Error, token: &RefreshToken) -> StoreError {
    let unique = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());

    if unique {
        StoreError::Conflict(token.fingerprint().to_string())
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl TokenStore for RefreshTokenRepository {
    async fn find_by_token_value(
        &self,
        value: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let query = format!("{SELECT_COLUMNS} WHERE token_value = $1");

        let token = sqlx::query_as::<_, RefreshToken>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(token)
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, StoreError> {
        let query = format!(
            "{SELECT_COLUMNS} WHERE user_id = $1 AND NOT deleted AND revoked_at IS NULL \
             AND expires_at > $2 ORDER BY created_at DESC"
        );

        let tokens = sqlx::query_as::<_, RefreshToken>(&query)
            .bind(user_id)
            .bind(Utc::now())
            .fetch_all(&self.pool)
            .await?;

        Ok(tokens)
    }

    async fn save(&self, token: &RefreshToken) -> Result<(), StoreError> {
        let query = format!(
            r#"{INSERT_TOKEN}
            ON CONFLICT (id) DO UPDATE SET
                expires_at = LEAST(refresh_tokens.expires_at, EXCLUDED.expires_at),
                revoked_at = COALESCE(refresh_tokens.revoked_at, EXCLUDED.revoked_at),
                revoked_by_ip = CASE
                    WHEN refresh_tokens.revoked_at IS NULL AND EXCLUDED.revoked_at IS NOT NULL
                        THEN EXCLUDED.revoked_by_ip
                    ELSE refresh_tokens.revoked_by_ip
                END,
                replaced_by_token_value = CASE
                    WHEN refresh_tokens.revoked_at IS NULL AND EXCLUDED.revoked_at IS NOT NULL
                        THEN EXCLUDED.replaced_by_token_value
                    ELSE refresh_tokens.replaced_by_token_value
                END,
                deleted = refresh_tokens.deleted OR EXCLUDED.deleted
            "#
        );

        sqlx::query(&query)
            .bind(token.id)
            .bind(token.user_id)
            .bind(&token.token_value)
            .bind(token.created_at)
            .bind(&token.created_by_ip)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(&token.revoked_by_ip)
            .bind(&token.replaced_by_token_value)
            .bind(token.deleted)
            .execute(&self.pool)
            .await
            .map_err(|err| write_error(err, token))?;

        Ok(())
    }

    async fn revoke_if_active(
        &self,
        value: &str,
        at: DateTime<Utc>,
        ip: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, revoked_by_ip = $3
            WHERE token_value = $1
              AND NOT deleted
              AND revoked_at IS NULL
              AND expires_at > $2
            "#,
        )
        .bind(value)
        .bind(at)
        .bind(ip)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn rotate(
        &self,
        presented: &str,
        at: DateTime<Utc>,
        ip: &str,
        replacement: &RefreshToken,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        Self::insert_in(&mut tx, replacement).await?;

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, revoked_by_ip = $3, replaced_by_token_value = $4
            WHERE token_value = $1
              AND NOT deleted
              AND revoked_at IS NULL
              AND expires_at > $2
            "#,
        )
        .bind(presented)
        .bind(at)
        .bind(ip)
        .bind(&replacement.token_value)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn soft_delete_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET deleted = TRUE
            WHERE NOT deleted
              AND created_at < $1
              AND (revoked_at IS NOT NULL OR expires_at <= $2)
            "#,
        )
        .bind(cutoff)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

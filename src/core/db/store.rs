//! Token store abstraction
//!
//! The session manager only talks to persistence through [`TokenStore`]. Every
//! implementation must make the conditional writes (`revoke_if_active`, `rotate`)
//! atomic per token value; cross-row consistency is not required.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::db::models::RefreshToken;

/// Token store error types
///
/// These are infrastructure failures, never business outcomes. A store that cannot
/// answer must say so rather than report "not found".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Token value already in use: {0}")]
    Conflict(String),

    #[error("Token store unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence interface for refresh tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Look up a token by its raw value.
    ///
    /// Soft-deleted rows are still returned so replays of pruned tokens are detected.
    async fn find_by_token_value(&self, value: &str)
    -> Result<Option<RefreshToken>, StoreError>;

    /// All non-deleted, currently active tokens for a user, newest first
    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, StoreError>;

    /// Insert or update a token by id.
    ///
    /// An update never makes the stored row more usable: expiry only moves earlier,
    /// revocation fields already stored are never cleared, and a successor link is
    /// only accepted together with the revocation that creates it. Saving a token
    /// whose value belongs to any other row, soft-deleted or not, fails with
    /// [`StoreError::Conflict`].
    async fn save(&self, token: &RefreshToken) -> Result<(), StoreError>;

    /// Revoke `value` if, and only if, it is still unrevoked and unexpired at `at`.
    ///
    /// Returns `true` when this call performed the revocation.
    async fn revoke_if_active(
        &self,
        value: &str,
        at: DateTime<Utc>,
        ip: &str,
    ) -> Result<bool, StoreError>;

    /// Atomically supersede `presented` with `replacement`.
    ///
    /// The replacement is persisted first, then `presented` is revoked and linked to
    /// it under the same condition as [`TokenStore::revoke_if_active`]. If the
    /// condition fails the replacement is discarded and `false` is returned. For any
    /// single presented value at most one call ever returns `true`.
    async fn rotate(
        &self,
        presented: &str,
        at: DateTime<Utc>,
        ip: &str,
        replacement: &RefreshToken,
    ) -> Result<bool, StoreError>;

    /// Soft-delete inactive tokens created before `cutoff`; returns the number marked
    async fn soft_delete_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

//! Refresh token model
//!
//! One row per issued session credential. Activity and expiry are derived from the
//! stored timestamps at read time and are never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Refresh Token Model
// ============================================================================

/// A long-lived session credential that can be exchanged for a new token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Opaque secret handed to the client
    pub token_value: String,
    pub created_at: DateTime<Utc>,
    pub created_by_ip: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by_ip: Option<String>,
    /// Forward link to the token that superseded this one during rotation
    pub replaced_by_token_value: Option<String>,
    /// Soft-delete flag; rows are retained for audit and replay detection
    pub deleted: bool,
}

impl RefreshToken {
    /// Check whether the token is expired at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check whether the token can still be used at the given instant
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && !self.is_expired_at(now)
    }

    /// Check whether the token is expired right now
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check whether the token is active right now
    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// A revoked token with a replacement was rotated away; presenting it again is a replay
    pub fn was_replaced(&self) -> bool {
        self.is_revoked() && self.replaced_by_token_value.is_some()
    }

    /// Fold `incoming` into `self` without ever making the stored row more usable.
    ///
    /// Expiry can only move earlier. Revocation fields already set on the stored row
    /// win over the incoming copy, and a successor link is only accepted together
    /// with the revocation that creates it, so a stale in-flight update can neither
    /// reactivate a token nor re-point its chain.
    pub fn merge_monotonic(&mut self, incoming: RefreshToken) {
        let expires_at = self.expires_at.min(incoming.expires_at);
        let deleted = self.deleted || incoming.deleted;

        if self.revoked_at.is_none() && incoming.revoked_at.is_some() {
            self.revoked_at = incoming.revoked_at;
            self.revoked_by_ip = incoming.revoked_by_ip;
            self.replaced_by_token_value = incoming.replaced_by_token_value;
        }

        self.expires_at = expires_at;
        self.deleted = deleted;
    }

    /// Short, log-safe prefix of the token value
    pub fn fingerprint(&self) -> &str {
        fingerprint(&self.token_value)
    }
}

/// Short, log-safe prefix of a raw token value
pub fn fingerprint(token_value: &str) -> &str {
    let end = token_value
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token_value.len());
    &token_value[..end]
}

// ============================================================================
// Tests
// ============================================================================

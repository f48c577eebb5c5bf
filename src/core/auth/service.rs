//! Session manager
//!
//! Drives the refresh-token state machine: login issues a token pair, refresh rotates
//! the presented token into a linked successor, and revocation ends a session. A
//! rotated-away token that shows up again is treated as stolen and the whole chain
//! of its descendants is revoked.
//!
//! Clients hold raw refresh values; the store only ever sees their digests.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::gateway::{AuthGateway, Credentials, GatewayError, UserIdentity};
use crate::core::auth::issuer::{TokenIssuer, hash_token};
use crate::core::auth::jwt::{AccessClaims, JwtError};
use crate::core::db::models::{RefreshToken, fingerprint};
use crate::core::db::store::{StoreError, TokenStore};

/// Upper bound on replacement links followed during a cascading revocation
const MAX_CHAIN_HOPS: usize = 64;

/// Why a refresh was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("Refresh token not found")]
    NotFound,

    #[error("Refresh token is no longer active")]
    Inactive,

    #[error("Refresh token reuse detected")]
    Reused,
}

/// Why a revocation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RevokeFailure {
    #[error("Refresh token not found")]
    NotFound,

    #[error("Refresh token already inactive")]
    AlreadyInactive,
}

/// Session manager error types
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Deliberately uniform: never says whether the user exists
    #[error("Invalid credentials")]
    AuthFailure,

    #[error(transparent)]
    Refresh(#[from] RefreshFailure),

    #[error(transparent)]
    Revoke(#[from] RevokeFailure),

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Access token expired")]
    AccessTokenExpired,

    #[error("Token store error: {0}")]
    Store(#[from] StoreError),

    #[error("Auth gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Token issuing failed: {0}")]
    Token(#[from] JwtError),
}

impl SessionError {
    /// Infrastructure failure the caller may retry; maps to a generic server error
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Store(_) | SessionError::Gateway(_))
    }

    /// Rule outcome that should be shown to the client as-is
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            SessionError::AuthFailure
                | SessionError::Refresh(_)
                | SessionError::Revoke(_)
                | SessionError::InvalidAccessToken
                | SessionError::AccessTokenExpired
        )
    }
}

/// Token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token value (long-lived, opaque)
    pub refresh_token: String,
    /// Access token expiration (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiration (Unix timestamp), for binding cookie lifetimes
    pub refresh_expires_at: i64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

impl TokenPair {
    fn new(access: (String, i64), refresh_value: String, refresh: &RefreshToken) -> Self {
        let (access_token, access_expires_at) = access;
        Self {
            access_token,
            refresh_token: refresh_value,
            access_expires_at,
            refresh_expires_at: refresh.expires_at.timestamp(),
            token_type: "Bearer".to_string(),
        }
    }
}

/// Authentication response with user data and tokens
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: UserIdentity,
    pub tokens: TokenPair,
}

/// Session manager
///
/// Stateless apart from its injected collaborators; clone it freely across request
/// handlers.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn TokenStore>,
    gateway: Arc<dyn AuthGateway>,
    issuer: TokenIssuer,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        store: Arc<dyn TokenStore>,
        gateway: Arc<dyn AuthGateway>,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            store,
            gateway,
            issuer,
        }
    }

    /// Verify credentials and open a new session
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        ip: &str,
    ) -> Result<AuthResponse, SessionError> {
        let Some(user) = self.gateway.verify_credentials(credentials).await? else {
            tracing::info!(ip, "Authentication rejected");
            return Err(SessionError::AuthFailure);
        };

        let access = self.issuer.issue_access_token(&user)?;
        let (refresh_value, refresh) = self.issuer.issue_refresh_token(user.id, ip);
        self.store.save(&refresh).await?;

        tracing::info!(user_id = %user.id, ip, "User authenticated");

        Ok(AuthResponse {
            tokens: TokenPair::new(access, refresh_value, &refresh),
            user,
        })
    }

    /// Exchange a refresh token for a new token pair, rotating it
    pub async fn refresh_token(&self, presented: &str, ip: &str) -> Result<TokenPair, SessionError> {
        let digest = hash_token(presented);
        let token = self
            .store
            .find_by_token_value(&digest)
            .await?
            .ok_or(RefreshFailure::NotFound)?;

        self.ensure_refreshable(&token, ip, Utc::now()).await?;

        let Some(user) = self.gateway.find_user(token.user_id).await? else {
            tracing::warn!(user_id = %token.user_id, "Refresh for unknown user, revoking token");
            self.store.revoke_if_active(&digest, Utc::now(), ip).await?;
            return Err(RefreshFailure::Inactive.into());
        };

        let access = self.issuer.issue_access_token(&user)?;
        // The gateway call may have outlived the token; the swap is judged at this instant
        let now = Utc::now();
        let (replacement_value, replacement) = self.issuer.issue_refresh_token_at(user.id, ip, now);

        if !self.store.rotate(&digest, now, ip, &replacement).await? {
            // Someone else changed the token between our read and the swap
            tracing::debug!(token = token.fingerprint(), "Lost rotation race");
            let current = self
                .store
                .find_by_token_value(&digest)
                .await?
                .ok_or(RefreshFailure::NotFound)?;
            self.ensure_refreshable(&current, ip, Utc::now()).await?;
            return Err(RefreshFailure::Inactive.into());
        }

        tracing::debug!(
            user_id = %user.id,
            from = token.fingerprint(),
            to = replacement.fingerprint(),
            "Refresh token rotated"
        );

        Ok(TokenPair::new(access, replacement_value, &replacement))
    }

    /// Revoke a single refresh token without issuing a replacement
    pub async fn revoke_token(&self, presented: &str, ip: &str) -> Result<(), SessionError> {
        let digest = hash_token(presented);
        let token = self
            .store
            .find_by_token_value(&digest)
            .await?
            .ok_or(RevokeFailure::NotFound)?;

        let now = Utc::now();
        if token.deleted || !token.is_active_at(now) {
            return Err(RevokeFailure::AlreadyInactive.into());
        }

        if !self.store.revoke_if_active(&digest, now, ip).await? {
            return Err(RevokeFailure::AlreadyInactive.into());
        }

        tracing::info!(user_id = %token.user_id, token = token.fingerprint(), ip, "Refresh token revoked");
        Ok(())
    }

    /// Revoke every active session of a user (logout from all devices)
    pub async fn revoke_all_sessions(&self, user_id: Uuid, ip: &str) -> Result<u64, SessionError> {
        let now = Utc::now();
        let mut revoked = 0;

        for token in self.store.find_active_by_user(user_id).await? {
            if self
                .store
                .revoke_if_active(&token.token_value, now, ip)
                .await?
            {
                revoked += 1;
            }
        }

        tracing::info!(user_id = %user_id, revoked, "All sessions revoked");
        Ok(revoked)
    }

    /// Active refresh tokens of a user, newest first
    pub async fn active_sessions(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, SessionError> {
        Ok(self.store.find_active_by_user(user_id).await?)
    }

    /// Validate an access token and return its claims
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, SessionError> {
        self.issuer
            .validate_access_token(token)
            .map_err(|err| match err {
                JwtError::Expired => SessionError::AccessTokenExpired,
                _ => SessionError::InvalidAccessToken,
            })
    }

    /// Soft-delete inactive tokens older than `retention` (should be run periodically)
    pub async fn prune_stale_tokens(&self, retention: Duration) -> Result<u64, SessionError> {
        let cutoff = Utc::now() - retention;
        let pruned = self.store.soft_delete_inactive_before(cutoff).await?;

        tracing::info!(pruned, %cutoff, "Stale refresh tokens pruned");
        Ok(pruned)
    }

    /// Classify a token that is about to be rotated.
    ///
    /// Any revoked token with a successor is a replay: its descendants are revoked
    /// before the failure is returned.
    async fn ensure_refreshable(
        &self,
        token: &RefreshToken,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if token.was_replaced() {
            let revoked = self.revoke_descendants(token, ip).await?;
            tracing::warn!(
                user_id = %token.user_id,
                token = token.fingerprint(),
                ip,
                revoked,
                "Refresh token reuse detected, descendant sessions revoked"
            );
            return Err(RefreshFailure::Reused.into());
        }

        if token.deleted || !token.is_active_at(now) {
            return Err(RefreshFailure::Inactive.into());
        }

        Ok(())
    }

    /// Walk the replacement chain forward from `origin`, revoking active descendants.
    ///
    /// Each step is an independent store update; the walk is best effort.
    async fn revoke_descendants(&self, origin: &RefreshToken, ip: &str) -> Result<u64, SessionError> {
        let mut visited = HashSet::from([origin.token_value.clone()]);
        let mut next = origin.replaced_by_token_value.clone();
        let mut revoked = 0;

        while let Some(value) = next.take() {
            if visited.len() > MAX_CHAIN_HOPS {
                tracing::warn!(user_id = %origin.user_id, "Replacement chain exceeds hop limit");
                break;
            }
            if !visited.insert(value.clone()) {
                tracing::warn!(token = fingerprint(&value), "Replacement chain revisits a token");
                break;
            }

            let Some(mut descendant) = self.store.find_by_token_value(&value).await? else {
                tracing::warn!(token = fingerprint(&value), "Replacement chain points to a missing token");
                break;
            };

            if descendant.user_id != origin.user_id {
                tracing::warn!(token = fingerprint(&value), "Replacement chain crosses users");
                break;
            }

            let now = Utc::now();
            if descendant.is_active_at(now) {
                if self.store.revoke_if_active(&value, now, ip).await? {
                    revoked += 1;
                } else if let Some(fresh) = self.store.find_by_token_value(&value).await? {
                    // Rotated concurrently; follow the new link
                    descendant = fresh;
                }
            }

            next = descendant.replaced_by_token_value;
        }

        Ok(revoked)
    }
}

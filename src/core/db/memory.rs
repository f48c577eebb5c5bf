//! In-memory token store
//!
//! Reference [`TokenStore`] backed by a `DashMap` keyed by token value. Each
//! conditional write holds the shard lock for its entry across the check and the
//! update, which gives the per-token atomicity the session manager relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::core::db::models::{RefreshToken, fingerprint};
use crate::core::db::store::{StoreError, TokenStore};

/// Process-local token store
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: DashMap<String, RefreshToken>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows held, including revoked and soft-deleted ones
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn upsert(&self, token: &RefreshToken) -> Result<(), StoreError> {
        match self.tokens.entry(token.token_value.clone()) {
            Entry::Occupied(mut entry) => {
                // Soft-deleted rows keep their value reserved
                if entry.get().id != token.id {
                    return Err(StoreError::Conflict(token.fingerprint().to_string()));
                }
                entry.get_mut().merge_monotonic(token.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(token.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn find_by_token_value(
        &self,
        value: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.tokens.get(value).map(|entry| entry.value().clone()))
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, StoreError> {
        let now = Utc::now();
        let mut active: Vec<RefreshToken> = self
            .tokens
            .iter()
            .filter(|entry| {
                let token = entry.value();
                token.user_id == user_id && !token.deleted && token.is_active_at(now)
            })
            .map(|entry| entry.value().clone())
            .collect();

        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn save(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.upsert(token)
    }

    async fn revoke_if_active(
        &self,
        value: &str,
        at: DateTime<Utc>,
        ip: &str,
    ) -> Result<bool, StoreError> {
        let Some(mut token) = self.tokens.get_mut(value) else {
            return Ok(false);
        };

        if token.deleted || !token.is_active_at(at) {
            return Ok(false);
        }

        token.revoked_at = Some(at);
        token.revoked_by_ip = Some(ip.to_string());
        Ok(true)
    }

    async fn rotate(
        &self,
        presented: &str,
        at: DateTime<Utc>,
        ip: &str,
        replacement: &RefreshToken,
    ) -> Result<bool, StoreError> {
        if replacement.token_value == presented {
            return Err(StoreError::Conflict(fingerprint(presented).to_string()));
        }

        // Insert first so the forward link never dangles. Nobody else knows the new
        // value yet, so the row is unreachable until the link below is written.
        self.upsert(replacement)?;

        let linked = match self.tokens.get_mut(presented) {
            Some(mut token) => {
                if !token.deleted && token.is_active_at(at) {
                    token.revoked_at = Some(at);
                    token.revoked_by_ip = Some(ip.to_string());
                    token.replaced_by_token_value = Some(replacement.token_value.clone());
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if !linked {
            self.tokens
                .remove_if(&replacement.token_value, |_, token| token.id == replacement.id);
        }

        Ok(linked)
    }

    async fn soft_delete_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut marked = 0;

        for mut entry in self.tokens.iter_mut() {
            let token = entry.value_mut();
            if !token.deleted && token.created_at < cutoff && !token.is_active_at(now) {
                token.deleted = true;
                marked += 1;
            }
        }

        Ok(marked)
    }
}

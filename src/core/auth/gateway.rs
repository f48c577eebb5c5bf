//! Credential verification boundary
//!
//! The session core never sees password hashes or user tables. It asks an
//! [`AuthGateway`] to turn credentials into a [`UserIdentity`] and to resolve a user
//! id back to its current identity when minting access tokens during rotation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Login credentials
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Identity and claims carried by access tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Gateway failures (backend unreachable, timeouts). Never used for bad credentials.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Credential backend unavailable: {0}")]
    Unavailable(String),
}

/// External credential checker and user directory
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Verify credentials. `Ok(None)` means rejected, for whatever reason.
    async fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<UserIdentity>, GatewayError>;

    /// Resolve a user id to its current identity, `Ok(None)` if the user is gone
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserIdentity>, GatewayError>;
}

//! Shared test doubles and fixtures

use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::core::auth::gateway::{AuthGateway, Credentials, GatewayError, UserIdentity};
use crate::core::auth::issuer::{TokenIssuer, generate_token_value, hash_token};
use crate::core::auth::jwt::{JwtConfig, JwtService};
use crate::core::auth::service::{AuthResponse, SessionManager};
use crate::core::db::memory::InMemoryTokenStore;
use crate::core::db::models::RefreshToken;
use crate::core::db::store::{StoreError, TokenStore};

pub const TEST_SECRET: &str = "test_secret_key_for_testing_only_32bytes!";

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness; honours RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Raw value plus an unsaved active-or-expired token holding its digest
pub fn token_for(user_id: Uuid, lifetime: Duration) -> (String, RefreshToken) {
    let now = Utc::now();
    let value = generate_token_value();
    let token = RefreshToken {
        id: Uuid::new_v4(),
        user_id,
        token_value: hash_token(&value),
        created_at: now,
        created_by_ip: "127.0.0.1".to_string(),
        expires_at: now + lifetime,
        revoked_at: None,
        revoked_by_ip: None,
        replaced_by_token_value: None,
        deleted: false,
    };
    (value, token)
}

// ============================================================================
// Gateway
// ============================================================================

/// Gateway over a fixed user table with plaintext passwords
#[derive(Default)]
pub struct StaticGateway {
    users: DashMap<Uuid, (String, UserIdentity)>,
    unavailable: AtomicBool,
    lookup_delay_ms: AtomicU64,
}

impl StaticGateway {
    pub fn with_alice() -> Self {
        let gateway = Self::default();
        gateway.add_user("alice", "Password123", &["user"]);
        gateway
    }

    pub fn add_user(&self, username: &str, password: &str, roles: &[&str]) -> UserIdentity {
        let identity = UserIdentity {
            id: Uuid::new_v4(),
            username: username.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        self.users
            .insert(identity.id, (password.to_string(), identity.clone()));
        identity
    }

    pub fn identity(&self, username: &str) -> Option<UserIdentity> {
        self.users
            .iter()
            .find(|entry| entry.value().1.username == username)
            .map(|entry| entry.value().1.clone())
    }

    pub fn remove_user(&self, id: Uuid) {
        self.users.remove(&id);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every `find_user` call take at least `delay`
    pub fn set_lookup_delay(&self, delay: std::time::Duration) {
        self.lookup_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("directory offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthGateway for StaticGateway {
    async fn verify_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Option<UserIdentity>, GatewayError> {
        self.check()?;
        Ok(self
            .users
            .iter()
            .find(|entry| {
                let (password, identity) = entry.value();
                identity.username == credentials.username && *password == credentials.password
            })
            .map(|entry| entry.value().1.clone()))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserIdentity>, GatewayError> {
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        self.check()?;
        Ok(self.users.get(&user_id).map(|entry| entry.value().1.clone()))
    }
}

// ============================================================================
// Store
// ============================================================================

/// Store wrapper that fails every call while `failing` is set
pub struct FlakyStore {
    inner: InMemoryTokenStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: InMemoryTokenStore) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FlakyStore {
    async fn find_by_token_value(
        &self,
        value: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        self.check()?;
        self.inner.find_by_token_value(value).await
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, StoreError> {
        self.check()?;
        self.inner.find_active_by_user(user_id).await
    }

    async fn save(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save(token).await
    }

    async fn revoke_if_active(
        &self,
        value: &str,
        at: DateTime<Utc>,
        ip: &str,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.revoke_if_active(value, at, ip).await
    }

    async fn rotate(
        &self,
        presented: &str,
        at: DateTime<Utc>,
        ip: &str,
        replacement: &RefreshToken,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.rotate(presented, at, ip, replacement).await
    }

    async fn soft_delete_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.soft_delete_inactive_before(cutoff).await
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Session manager wired to an in-memory store and a one-user gateway
pub struct Harness {
    pub manager: SessionManager,
    pub store: Arc<InMemoryTokenStore>,
    pub gateway: Arc<StaticGateway>,
    pub user: UserIdentity,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();

        let store = Arc::new(InMemoryTokenStore::new());
        let gateway = Arc::new(StaticGateway::with_alice());
        let user = gateway
            .identity("alice")
            .expect("fixture user is always present");
        let manager = Self::manager(store.clone(), gateway.clone());

        Self {
            manager,
            store,
            gateway,
            user,
        }
    }

    pub fn manager(store: Arc<dyn TokenStore>, gateway: Arc<dyn AuthGateway>) -> SessionManager {
        let issuer = TokenIssuer::new(JwtService::new(JwtConfig::new(TEST_SECRET)));
        SessionManager::new(store, gateway, issuer)
    }

    pub fn credentials() -> Credentials {
        Credentials::new("alice", "Password123")
    }

    pub async fn login(&self, ip: &str) -> AuthResponse {
        self.manager
            .authenticate(&Self::credentials(), ip)
            .await
            .expect("fixture credentials are valid")
    }

    /// Stored row for a raw refresh value held by a client
    pub async fn row(&self, value: &str) -> RefreshToken {
        self.store
            .find_by_token_value(&hash_token(value))
            .await
            .expect("in-memory store does not fail")
            .expect("token is stored")
    }
}

//! Token issuance
//!
//! Builds access tokens (signed JWTs) and refresh tokens (256-bit random values).
//! A refresh token is handed out as its raw value while the record to persist
//! carries only the SHA-256 digest. Nothing here touches storage.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::auth::gateway::UserIdentity;
use crate::core::auth::jwt::{AccessClaims, JwtError, JwtService};
use crate::core::db::models::RefreshToken;

/// Entropy of a refresh token value in bytes (256 bits)
const REFRESH_TOKEN_BYTES: usize = 32;

/// Creates access and refresh tokens for a user
#[derive(Clone)]
pub struct TokenIssuer {
    jwt_service: JwtService,
    refresh_lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(jwt_service: JwtService) -> Self {
        let refresh_lifetime = jwt_service.refresh_token_lifetime();
        Self {
            jwt_service,
            refresh_lifetime,
        }
    }

    /// Signed, short-lived access token and its expiry (Unix timestamp)
    pub fn issue_access_token(&self, user: &UserIdentity) -> Result<(String, i64), JwtError> {
        self.jwt_service.generate_access_token(user)
    }

    /// Fresh refresh token for `user_id`: the raw value for the client and the
    /// unsaved record keyed by its digest
    pub fn issue_refresh_token(&self, user_id: Uuid, ip: &str) -> (String, RefreshToken) {
        self.issue_refresh_token_at(user_id, ip, Utc::now())
    }

    pub(crate) fn issue_refresh_token_at(
        &self,
        user_id: Uuid,
        ip: &str,
        now: DateTime<Utc>,
    ) -> (String, RefreshToken) {
        let value = generate_token_value();
        let record = RefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token_value: hash_token(&value),
            created_at: now,
            created_by_ip: ip.to_string(),
            expires_at: now + self.refresh_lifetime,
            revoked_at: None,
            revoked_by_ip: None,
            replaced_by_token_value: None,
            deleted: false,
        };
        (value, record)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        self.jwt_service.validate_access_token(token)
    }

    pub fn refresh_lifetime(&self) -> Duration {
        self.refresh_lifetime
    }
}

/// Hex-encoded random value drawn from the OS CSPRNG
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest of a raw refresh value, hex-encoded; this is what gets stored
pub fn hash_token(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::jwt::JwtConfig;
    use std::collections::HashSet;

    fn create_test_issuer() -> TokenIssuer {
        TokenIssuer::new(JwtService::new(JwtConfig::new(
            "test_secret_key_for_testing_only_32bytes!",
        )))
    }

    #[test]
    fn test_token_value_has_256_bits() {
        let value = generate_token_value();

        // 32 bytes = 64 hex characters
        assert_eq!(value.len(), 64);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_token_values_do_not_repeat() {
        let values: HashSet<String> = (0..1000).map(|_| generate_token_value()).collect();
        assert_eq!(values.len(), 1000);
    }

    #[test]
    fn test_hash_token_is_stable_hex_digest() {
        let digest = hash_token("abc");

        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_token("abc"), digest);
        assert_ne!(hash_token("abd"), digest);
    }

    #[test]
    fn test_issue_refresh_token_fields() {
        let issuer = create_test_issuer();
        let user_id = Uuid::new_v4();

        let (value, token) = issuer.issue_refresh_token(user_id, "1.1.1.1");

        assert_eq!(token.token_value, hash_token(&value));
        assert_ne!(token.token_value, value);
        assert_eq!(token.user_id, user_id);
        assert_eq!(token.created_by_ip, "1.1.1.1");
        assert_eq!(token.expires_at - token.created_at, Duration::days(7));
        assert!(token.revoked_at.is_none());
        assert!(token.revoked_by_ip.is_none());
        assert!(token.replaced_by_token_value.is_none());
        assert!(!token.deleted);
        assert!(token.is_active());
    }

    #[test]
    fn test_refresh_lifetime_follows_config() {
        let issuer = TokenIssuer::new(JwtService::new(
            JwtConfig::new("secret").refresh_token_expiration(1),
        ));

        let (_, token) = issuer.issue_refresh_token(Uuid::new_v4(), "ip");

        assert_eq!(issuer.refresh_lifetime(), Duration::days(1));
        assert_eq!(token.expires_at - token.created_at, Duration::days(1));
    }

    #[test]
    fn test_issue_access_token_round_trips_identity() {
        let issuer = create_test_issuer();
        let user = UserIdentity {
            id: Uuid::new_v4(),
            username: "carol".to_string(),
            roles: vec!["admin".to_string()],
        };

        let (token, exp) = issuer.issue_access_token(&user).unwrap();
        let claims = issuer.validate_access_token(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.exp, exp);
        assert!(claims.has_role("admin"));
    }
}

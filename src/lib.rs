//! Refresh Sessions - refresh token lifecycle management
//!
//! Login issues a short-lived JWT access token plus an opaque refresh token. Each
//! refresh rotates the presented token into a linked successor; presenting a
//! rotated-away token again revokes every session descended from it.
//!
//! Storage is abstracted behind [`TokenStore`]. An in-memory store is always
//! available and a PostgreSQL repository ships with the `postgres` feature. Stores
//! only ever hold SHA-256 digests of refresh values.

pub mod core;

pub use crate::core::auth::{
    AccessClaims, AuthGateway, AuthResponse, Credentials, GatewayError, JwtConfig, JwtError,
    JwtService, RefreshFailure, RevokeFailure, SessionError, SessionManager, TokenIssuer,
    TokenPair, UserIdentity, hash_token,
};
pub use crate::core::config::{Config, ConfigError};
pub use crate::core::db::{InMemoryTokenStore, RefreshToken, StoreError, TokenStore};
#[cfg(feature = "postgres")]
pub use crate::core::db::{DbConfig, DbError, RefreshTokenRepository, open_token_store};

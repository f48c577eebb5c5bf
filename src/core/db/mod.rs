//! Persistence for refresh tokens
//!
//! The [`TokenStore`] trait is the only thing the session manager depends on. An
//! in-memory store is always available; the PostgreSQL repository and its bootstrap
//! are compiled with the `postgres` feature.

pub mod memory;
pub mod models;
#[cfg(feature = "postgres")]
pub mod pool;
#[cfg(feature = "postgres")]
pub mod repositories;
pub mod store;

pub use memory::InMemoryTokenStore;
pub use models::RefreshToken;
#[cfg(feature = "postgres")]
pub use pool::{DbConfig, DbError, open_token_store};
#[cfg(feature = "postgres")]
pub use repositories::RefreshTokenRepository;
pub use store::{StoreError, TokenStore};

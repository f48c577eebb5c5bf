//! Database repositories
//!
//! PostgreSQL-backed implementations of the storage traits.

pub mod refresh_token;

pub use refresh_token::RefreshTokenRepository;

//! PostgreSQL token store bootstrap
//!
//! Opens a pool, applies the embedded `refresh_tokens` migration and hands back a
//! ready [`RefreshTokenRepository`].

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use crate::core::config::{Config, DB_MAX_CONNECTIONS};
use crate::core::db::repositories::RefreshTokenRepository;

/// How long a caller waits for a pooled connection before the store reports an error
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the token store
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DB_MAX_CONNECTIONS,
            acquire_timeout: ACQUIRE_TIMEOUT,
        }
    }

    /// Build from application config; fails if no database URL is configured
    pub fn from_config(config: &Config) -> Result<Self, DbError> {
        let url = config
            .database_url()
            .map_err(|_| DbError::MissingDatabaseUrl)?;

        Ok(Self {
            max_connections: config.db_max_connections,
            ..Self::new(url)
        })
    }

    /// Create config from environment variables (and `.env`, if present)
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_config(&Config::load())
    }
}

/// Token store bootstrap errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("Failed to connect to token store: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Failed to migrate token store: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect, bring the schema up to date and return the repository
pub async fn open_token_store(config: &DbConfig) -> Result<RefreshTokenRepository, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!(
        max_connections = config.max_connections,
        "Refresh token store ready"
    );

    Ok(RefreshTokenRepository::new(pool))
}

//! Postgres connection setup
//!
//! Only used when `DATABASE_URL` is configured; otherwise the in-memory
//! store backs the service.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("DATABASE_URL is not configured")]
    NotConfigured,

    #[error("Failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Failed to apply schema migrations: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

/// Opens the pool and brings the schema up to date before any request is
/// served.
pub async fn connect(config: &Config) -> Result<PgPool, DbError> {
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn create_pool(config: &Config) -> Result<PgPool, DbError> {
    let url = config.database_url.as_deref().ok_or(DbError::NotConfigured)?;
    tracing::info!(
        url = %config.database_url_masked().unwrap_or_default(),
        max_connections = config.db_max_connections,
        "Connecting to Postgres"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect(url)
        .await
        .map_err(DbError::Connect)?;

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(DbError::Migrate)?;

    tracing::info!("Schema migrations applied");
    Ok(())
}

//! Database migration command.
//!
//! Applies the shop schema embedded in `campus-eats-shop` and creates the
//! `tower_sessions` table used by both web services.

use thiserror::Error;
use tower_sessions_sqlx_store::PostgresStore;

use campus_eats_shop::db;

use super::{CommandError, connect};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("session store migration error: {0}")]
    Sessions(#[from] sqlx::Error),
}

/// Run all migrations.
pub async fn run() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!("Running shop migrations...");
    db::run_migrations(&pool).await?;

    tracing::info!("Creating session table...");
    PostgresStore::new(pool).migrate().await?;

    tracing::info!("Migrations complete!");
    Ok(())
}

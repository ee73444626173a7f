//! Subcommand implementations.

pub mod migrate;
pub mod payments;
pub mod seed;
pub mod staff;

use sqlx::PgPool;
use thiserror::Error;

use campus_eats_shop::config::{ConfigError, get_database_url};
use campus_eats_shop::db;

/// Errors shared by every command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Load `.env` and connect to the shop database.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = get_database_url("CLI_DATABASE_URL")?;
    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}

//! CLI subcommands.

pub mod items;
pub mod migrate;

use secrecy::SecretString;
use thiserror::Error;

use voxelfox_website::db::RepositoryError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Database URL from `WEBSITE_DATABASE_URL`, falling back to `DATABASE_URL`.
fn database_url() -> Result<SecretString, CommandError> {
    let _ = dotenvy::dotenv();
    std::env::var("WEBSITE_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("WEBSITE_DATABASE_URL"))
}

/// Connect to the website database.
async fn connect() -> Result<sqlx::PgPool, CommandError> {
    let url = database_url()?;
    tracing::info!("Connecting to website database...");
    Ok(voxelfox_website::db::create_pool(&url).await?)
}

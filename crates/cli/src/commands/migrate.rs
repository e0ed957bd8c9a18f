//! Database migration command.
//!
//! Applies `crates/website/migrations/`. The website never migrates on
//! start-up, so run this before deploying a new version.

use super::{CommandError, connect};

/// Run website database migrations.
///
/// # Errors
///
/// Returns error if the database can't be reached or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running website migrations...");
    sqlx::migrate!("../website/migrations").run(&pool).await?;

    tracing::info!("Website migrations complete!");
    Ok(())
}

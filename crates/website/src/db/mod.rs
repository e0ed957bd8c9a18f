//! Database operations for the website `PostgreSQL`.
//!
//! ## Tables
//!
//! - `login_users` - Buyers and their linked Discord/Google/Facebook accounts
//! - `payment_users` - Sellers, with their Stripe and PayPal account IDs
//! - `checkout_items` - Purchasable products and where to notify about them
//! - `purchases` - Who owns what, keyed by the processor's identifier
//! - `transactions` - Ledger of money received and refunded
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/website/migrations/` and run via:
//! ```bash
//! cargo run -p voxelfox-cli -- migrate
//! ```
//!
//! Queries are checked at runtime (`sqlx::query_as` with `FromRow` rows) so
//! the crate builds without a database.

pub mod checkout_items;
pub mod login_users;
pub mod payment_users;
pub mod purchases;
pub mod transactions;

#[cfg(test)]
pub(crate) mod test_support;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use checkout_items::CheckoutItemRepository;
pub use login_users::LoginUserRepository;
pub use payment_users::PaymentUserRepository;
pub use purchases::{PurchaseIdentity, PurchaseRepository};
pub use transactions::TransactionRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique product name).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map unique violations to `Conflict`, everything else to `Database`.
fn map_unique_violation(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

//! Payment user (seller) repository.

use sqlx::PgPool;

use voxelfox_core::{LoginUserId, PaymentUserId};

use super::RepositoryError;
use crate::models::PaymentUser;

const COLUMNS: &str = "id, login_id, stripe_id, paypal_id";

/// Repository for payment user database operations.
pub struct PaymentUserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentUserRepository<'a> {
    /// Create a new payment user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a payment user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(
        &self,
        id: PaymentUserId,
    ) -> Result<Option<PaymentUser>, RepositoryError> {
        let user = sqlx::query_as::<_, PaymentUser>(&format!(
            "SELECT {COLUMNS} FROM payment_users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Get the payment user managed by a login user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_login_id(
        &self,
        login_id: LoginUserId,
    ) -> Result<Option<PaymentUser>, RepositoryError> {
        let user = sqlx::query_as::<_, PaymentUser>(&format!(
            "SELECT {COLUMNS} FROM payment_users WHERE login_id = $1"
        ))
        .bind(login_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }
}

//! Login user repository.

use sqlx::PgPool;

use voxelfox_core::LoginUserId;

use super::RepositoryError;
use crate::models::LoginUser;

const COLUMNS: &str = "id, discord_user_id, google_user_id, facebook_user_id, created_at";

/// Repository for login user database operations.
pub struct LoginUserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LoginUserRepository<'a> {
    /// Create a new login user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a login user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: LoginUserId) -> Result<Option<LoginUser>, RepositoryError> {
        let user = sqlx::query_as::<_, LoginUser>(&format!(
            "SELECT {COLUMNS} FROM login_users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Get a login user by their Discord account ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_discord_id(
        &self,
        discord_user_id: &str,
    ) -> Result<Option<LoginUser>, RepositoryError> {
        let user = sqlx::query_as::<_, LoginUser>(&format!(
            "SELECT {COLUMNS} FROM login_users WHERE discord_user_id = $1"
        ))
        .bind(discord_user_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Get the login user for a Discord account, creating one if needed.
    ///
    /// Upgrade.Chat and PayPal only tell us the buyer's Discord ID, so a
    /// purchase can arrive before the buyer has ever logged in.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create_by_discord_id(
        &self,
        discord_user_id: &str,
    ) -> Result<LoginUser, RepositoryError> {
        // The no-op update makes RETURNING yield the existing row
        let user = sqlx::query_as::<_, LoginUser>(&format!(
            r"
            INSERT INTO login_users (discord_user_id)
            VALUES ($1)
            ON CONFLICT (discord_user_id)
            DO UPDATE SET discord_user_id = excluded.discord_user_id
            RETURNING {COLUMNS}
            "
        ))
        .bind(discord_user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(user)
    }
}

//! Purchase repository.
//!
//! Processors re-deliver webhooks, so purchases are written with
//! `INSERT ... ON CONFLICT (identifier, product_id) DO UPDATE` and the same
//! event stored twice leaves a single row. A cart shares one identifier
//! across its items, each with its own row.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use voxelfox_core::{CheckoutItemId, LoginUserId, PurchaseId};

use super::RepositoryError;
use crate::models::{NewPurchase, Purchase, PurchaseOwner};

const COLUMNS: &str = "id, user_id, product_id, quantity, identifier, discord_guild_id, \
    cancel_url, expiry_time, timestamp";

/// An identity a downstream bot can ask about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseIdentity {
    LoginId(LoginUserId),
    Discord(String),
    Guild(i64),
    Google(String),
    Facebook(String),
}

/// Repository for purchase database operations.
pub struct PurchaseRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PurchaseRepository<'a> {
    /// Create a new purchase repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the purchase of an item stored under a processor identifier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_identifier(
        &self,
        identifier: &str,
        product_id: CheckoutItemId,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {COLUMNS} FROM purchases WHERE identifier = $1 AND product_id = $2"
        ))
        .bind(identifier)
        .bind(product_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(purchase)
    }

    /// List an owner's purchases of an item, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_owner(
        &self,
        owner: PurchaseOwner,
        product_id: CheckoutItemId,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        let sql = match owner {
            PurchaseOwner::User(_) => format!(
                r"
                SELECT {COLUMNS} FROM purchases
                WHERE user_id = $1 AND product_id = $2 AND discord_guild_id IS NULL
                ORDER BY timestamp DESC
                "
            ),
            PurchaseOwner::Guild(_) => format!(
                r"
                SELECT {COLUMNS} FROM purchases
                WHERE discord_guild_id = $1 AND product_id = $2
                ORDER BY timestamp DESC
                "
            ),
        };

        let query = sqlx::query_as::<_, Purchase>(&sql);
        let query = match owner {
            PurchaseOwner::User(user_id) => query.bind(user_id),
            PurchaseOwner::Guild(guild_id) => query.bind(guild_id),
        };

        let purchases = query.bind(product_id).fetch_all(self.pool).await?;
        Ok(purchases)
    }

    /// Get one of a user's purchases that can still be cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active_subscription(
        &self,
        id: PurchaseId,
        user_id: LoginUserId,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            r"
            SELECT {COLUMNS} FROM purchases
            WHERE id = $1 AND user_id = $2
                AND expiry_time IS NULL AND cancel_url IS NOT NULL
            "
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(purchase)
    }

    /// Insert a purchase, or overwrite the one with the same identifier and
    /// item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(&self, purchase: &NewPurchase) -> Result<Purchase, RepositoryError> {
        let timestamp = purchase.timestamp.unwrap_or_else(Utc::now);
        let row = sqlx::query_as::<_, Purchase>(&format!(
            r"
            INSERT INTO purchases (
                user_id, product_id, quantity, identifier, discord_guild_id,
                cancel_url, expiry_time, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (identifier, product_id) DO UPDATE SET
                user_id = excluded.user_id,
                quantity = excluded.quantity,
                discord_guild_id = excluded.discord_guild_id,
                cancel_url = excluded.cancel_url,
                expiry_time = excluded.expiry_time,
                timestamp = excluded.timestamp
            RETURNING {COLUMNS}
            "
        ))
        .bind(purchase.user_id)
        .bind(purchase.product_id)
        .bind(purchase.quantity)
        .bind(&purchase.identifier)
        .bind(purchase.discord_guild_id)
        .bind(purchase.cancel_url.as_deref())
        .bind(purchase.expiry_time)
        .bind(timestamp)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    /// Set (or clear) when a purchase stops granting access.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the purchase doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_expiry(
        &self,
        id: PurchaseId,
        expiry_time: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE purchases SET expiry_time = $2 WHERE id = $1")
            .bind(id)
            .bind(expiry_time)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a purchase (refunds and reversals).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: PurchaseId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM purchases WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// List an identity's active purchases of an item or any of its variants.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active_for_identity(
        &self,
        identity: &PurchaseIdentity,
        base_product_id: CheckoutItemId,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        let column = match identity {
            PurchaseIdentity::LoginId(_) => "lu.id",
            PurchaseIdentity::Discord(_) => "lu.discord_user_id",
            PurchaseIdentity::Guild(_) => "p.discord_guild_id",
            PurchaseIdentity::Google(_) => "lu.google_user_id",
            PurchaseIdentity::Facebook(_) => "lu.facebook_user_id",
        };
        let sql = format!(
            r"
            SELECT p.id, p.user_id, p.product_id, p.quantity, p.identifier,
                   p.discord_guild_id, p.cancel_url, p.expiry_time, p.timestamp
            FROM purchases p
            JOIN login_users lu ON lu.id = p.user_id
            JOIN checkout_items ci ON ci.id = p.product_id
            WHERE {column} = $1
                AND (p.product_id = $2 OR ci.base_product_id = $2)
                AND (p.expiry_time IS NULL OR p.expiry_time > NOW())
            ORDER BY p.timestamp DESC
            "
        );

        let query = sqlx::query_as::<_, Purchase>(&sql);
        let query = match identity {
            PurchaseIdentity::LoginId(id) => query.bind(*id),
            PurchaseIdentity::Guild(guild_id) => query.bind(*guild_id),
            PurchaseIdentity::Discord(value)
            | PurchaseIdentity::Google(value)
            | PurchaseIdentity::Facebook(value) => query.bind(value.as_str()),
        };

        let purchases = query
            .bind(base_product_id)
            .fetch_all(self.pool)
            .await?;
        Ok(purchases)
    }
}

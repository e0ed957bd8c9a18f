//! Checkout item repository.

use sqlx::PgPool;

use voxelfox_core::{CheckoutItemId, PaymentUserId};

use super::{RepositoryError, map_unique_violation};
use crate::models::{CheckoutItem, CheckoutItemUpdate, NewCheckoutItem};

const COLUMNS: &str = "id, creator_id, product_name, success_url, cancel_url, subscription, \
    stripe_product_id, stripe_price_id, paypal_plan_id, transaction_webhook, \
    transaction_webhook_authorization, product_group, per_guild, multiple, description, \
    quantity, required_logins, base_product_id";

/// Repository for checkout item database operations.
pub struct CheckoutItemRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CheckoutItemRepository<'a> {
    /// Create a new checkout item repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an item by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(
        &self,
        id: CheckoutItemId,
    ) -> Result<Option<CheckoutItem>, RepositoryError> {
        let item = sqlx::query_as::<_, CheckoutItem>(&format!(
            "SELECT {COLUMNS} FROM checkout_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(item)
    }

    /// Get the item sold as a given Stripe product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_stripe_product_id(
        &self,
        stripe_product_id: &str,
    ) -> Result<Option<CheckoutItem>, RepositoryError> {
        let item = sqlx::query_as::<_, CheckoutItem>(&format!(
            "SELECT {COLUMNS} FROM checkout_items WHERE stripe_product_id = $1 LIMIT 1"
        ))
        .bind(stripe_product_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(item)
    }

    /// Get an item by its product name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the name is not unique.
    pub async fn get_by_name(
        &self,
        product_name: &str,
    ) -> Result<Option<CheckoutItem>, RepositoryError> {
        let mut items = sqlx::query_as::<_, CheckoutItem>(&format!(
            "SELECT {COLUMNS} FROM checkout_items WHERE product_name = $1"
        ))
        .bind(product_name)
        .fetch_all(self.pool)
        .await?;

        if items.len() > 1 {
            return Err(RepositoryError::DataCorruption(format!(
                "{} checkout items named {product_name:?}",
                items.len()
            )));
        }
        Ok(items.pop())
    }

    /// List every item, grouped then named.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<CheckoutItem>, RepositoryError> {
        let items = sqlx::query_as::<_, CheckoutItem>(&format!(
            "SELECT {COLUMNS} FROM checkout_items ORDER BY product_group, product_name"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    /// List the items shown together on a portal page.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_group(
        &self,
        product_group: &str,
    ) -> Result<Vec<CheckoutItem>, RepositoryError> {
        let items = sqlx::query_as::<_, CheckoutItem>(&format!(
            "SELECT {COLUMNS} FROM checkout_items WHERE product_group = $1 ORDER BY product_name"
        ))
        .bind(product_group)
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    /// List an item together with every variant based on it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_family(
        &self,
        id: CheckoutItemId,
    ) -> Result<Vec<CheckoutItem>, RepositoryError> {
        let items = sqlx::query_as::<_, CheckoutItem>(&format!(
            "SELECT {COLUMNS} FROM checkout_items WHERE id = $1 OR base_product_id = $1"
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    /// Create an item, or replace the item with the same product name.
    ///
    /// Only the item's creator can replace it; the creator never changes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if another payment user already
    /// sells an item with this name.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_by_name(
        &self,
        item: &NewCheckoutItem,
    ) -> Result<CheckoutItem, RepositoryError> {
        let row = sqlx::query_as::<_, CheckoutItem>(&format!(
            r"
            INSERT INTO checkout_items (
                creator_id, product_name, success_url, cancel_url, subscription,
                stripe_product_id, stripe_price_id, paypal_plan_id, transaction_webhook,
                transaction_webhook_authorization, product_group
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (product_name) DO UPDATE SET
                success_url = excluded.success_url,
                cancel_url = excluded.cancel_url,
                subscription = excluded.subscription,
                stripe_product_id = excluded.stripe_product_id,
                stripe_price_id = excluded.stripe_price_id,
                paypal_plan_id = excluded.paypal_plan_id,
                transaction_webhook = excluded.transaction_webhook,
                transaction_webhook_authorization = excluded.transaction_webhook_authorization,
                product_group = excluded.product_group
            WHERE checkout_items.creator_id = excluded.creator_id
            RETURNING {COLUMNS}
            "
        ))
        .bind(item.creator_id)
        .bind(&item.product_name)
        .bind(&item.success_url)
        .bind(&item.cancel_url)
        .bind(item.subscription)
        .bind(&item.stripe_product_id)
        .bind(&item.stripe_price_id)
        .bind(item.paypal_plan_id.as_deref())
        .bind(item.transaction_webhook.as_deref())
        .bind(&item.transaction_webhook_authorization)
        .bind(item.product_group.as_deref())
        .fetch_optional(self.pool)
        .await?;
        row.ok_or_else(|| {
            RepositoryError::Conflict(format!(
                "product name {:?} belongs to another seller",
                item.product_name
            ))
        })
    }

    /// Apply a manager's edit to an item they created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item doesn't exist or
    /// belongs to another payment user.
    /// Returns `RepositoryError::Conflict` if the new product name is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update_for_creator(
        &self,
        id: CheckoutItemId,
        creator_id: PaymentUserId,
        update: &CheckoutItemUpdate,
    ) -> Result<CheckoutItem, RepositoryError> {
        sqlx::query_as::<_, CheckoutItem>(&format!(
            r"
            UPDATE checkout_items SET
                product_name = COALESCE($3, product_name),
                description = COALESCE($4, description),
                product_group = COALESCE($5, product_group),
                success_url = COALESCE($6, success_url),
                cancel_url = COALESCE($7, cancel_url),
                stripe_product_id = COALESCE($8, stripe_product_id),
                stripe_price_id = COALESCE($9, stripe_price_id),
                paypal_plan_id = COALESCE($10, paypal_plan_id)
            WHERE id = $1 AND creator_id = $2
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .bind(creator_id)
        .bind(update.product_name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.product_group.as_deref())
        .bind(update.success_url.as_deref())
        .bind(update.cancel_url.as_deref())
        .bind(update.stripe_product_id.as_deref())
        .bind(update.stripe_price_id.as_deref())
        .bind(update.paypal_plan_id.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "product name"))?
        .ok_or(RepositoryError::NotFound)
    }
}

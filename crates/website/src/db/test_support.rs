//! Fixtures for tests that run against a migrated database.

use sqlx::PgPool;

use voxelfox_core::{CheckoutItemId, LoginUserId, PaymentUserId};

use super::{CheckoutItemRepository, LoginUserRepository};
use crate::models::{CheckoutItem, NewCheckoutItem, NewPurchase};

/// Insert a seller with an optional PayPal merchant ID.
pub(crate) async fn seller(pool: &PgPool, paypal_id: Option<&str>) -> PaymentUserId {
    sqlx::query_scalar::<_, PaymentUserId>(
        "INSERT INTO payment_users (stripe_id, paypal_id) VALUES ('VFL', $1) RETURNING id",
    )
    .bind(paypal_id)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("insert payment user: {e}"))
}

/// A buyer linked to a Discord account.
pub(crate) async fn buyer(pool: &PgPool, discord_user_id: &str) -> LoginUserId {
    LoginUserRepository::new(pool)
        .get_or_create_by_discord_id(discord_user_id)
        .await
        .unwrap_or_else(|e| panic!("insert login user: {e}"))
        .id
}

/// An item without a notification webhook, so nothing is sent.
pub(crate) fn new_item(creator_id: PaymentUserId, product_name: &str) -> NewCheckoutItem {
    NewCheckoutItem {
        creator_id,
        product_name: product_name.to_string(),
        success_url: "https://voxelfox.co.uk/".to_string(),
        cancel_url: "https://voxelfox.co.uk/".to_string(),
        subscription: false,
        stripe_product_id: format!("prod_{}", product_name.replace(' ', "_")),
        stripe_price_id: "price_test".to_string(),
        paypal_plan_id: None,
        transaction_webhook: None,
        transaction_webhook_authorization: String::new(),
        product_group: Some("MarriageBot".to_string()),
    }
}

pub(crate) async fn item(pool: &PgPool, creator_id: PaymentUserId, product_name: &str) -> CheckoutItem {
    CheckoutItemRepository::new(pool)
        .upsert_by_name(&new_item(creator_id, product_name))
        .await
        .unwrap_or_else(|e| panic!("insert checkout item: {e}"))
}

pub(crate) fn new_purchase(
    user_id: LoginUserId,
    product_id: CheckoutItemId,
    identifier: &str,
) -> NewPurchase {
    NewPurchase {
        user_id,
        product_id,
        quantity: 1,
        identifier: identifier.to_string(),
        discord_guild_id: None,
        cancel_url: None,
        expiry_time: None,
        timestamp: None,
    }
}

/// Rows in `table` stored under `identifier`.
pub(crate) async fn count_by_identifier(pool: &PgPool, table: &str, identifier: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM {table} WHERE identifier = $1"
    ))
    .bind(identifier)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("count {table}: {e}"))
}

//! Upgrade.Chat order events.

use tracing::{info, instrument, warn};

use voxelfox_core::PaymentProcessor;

use super::find_existing;
use crate::db::{CheckoutItemRepository, LoginUserRepository, PurchaseRepository};
use crate::error::Result;
use crate::models::{NewPurchase, PurchaseOwner};
use crate::services::notifier::PurchaseNotification;
use crate::state::AppState;
use crate::upgradechat::{EventType, ProductMap, UpgradeChatClient, WebhookEvent};

/// The checkout item an order is for, by name.
fn checkout_item_name<'a>(event: &'a WebhookEvent, products: &'a ProductMap) -> Option<&'a str> {
    let order = event.order()?;
    let Some(name) = order.single_product_name() else {
        warn!(
            items = order.order_items.len(),
            "Upgrade.Chat order doesn't name exactly one product"
        );
        return None;
    };
    let mapped = products.get(name);
    if mapped.is_none() {
        info!(product = %name, "Upgrade.Chat product isn't mapped to a checkout item");
    }
    mapped
}

/// Handle a validated Upgrade.Chat event.
///
/// # Errors
///
/// Returns error if the database fails.
#[instrument(skip(state, client, event), fields(event_id = %event.id, event_type = ?event.event_type))]
pub async fn handle_event(
    state: &AppState,
    client: &UpgradeChatClient,
    event: &WebhookEvent,
) -> Result<()> {
    let Some(order) = event.order() else {
        warn!("Upgrade.Chat event has no order");
        return Ok(());
    };
    let Some(item_name) = checkout_item_name(event, &client.config().product_map) else {
        return Ok(());
    };
    let Some(mut item) = CheckoutItemRepository::new(state.pool())
        .get_by_name(item_name)
        .await?
    else {
        warn!(item = %item_name, "Mapped Upgrade.Chat product is not a checkout item");
        return Ok(());
    };
    item.subscription |= order.is_subscription;
    let Some(discord_id) = order.user.discord_id.as_deref().filter(|id| !id.is_empty()) else {
        warn!("Upgrade.Chat order has no Discord user");
        return Ok(());
    };
    let user = LoginUserRepository::new(state.pool())
        .get_or_create_by_discord_id(discord_id)
        .await?;

    let purchases = PurchaseRepository::new(state.pool());
    let identifier = order.payment_processor_record_id.as_str();
    let mut notification = PurchaseNotification::new(&item, PaymentProcessor::UpgradeChat);
    notification.discord_user_id = Some(discord_id.to_owned());

    match event.event_type {
        EventType::OrderCreated => {
            let purchase = purchases
                .upsert(&NewPurchase {
                    user_id: user.id,
                    product_id: item.id,
                    quantity: item.quantity,
                    identifier: identifier.to_owned(),
                    discord_guild_id: None,
                    cancel_url: None,
                    expiry_time: None,
                    timestamp: order.purchased_at,
                })
                .await?;
            info!(purchase_id = %purchase.id, "Stored Upgrade.Chat purchase");
        }
        EventType::OrderUpdated => {
            let Some(cancelled_at) = order.cancelled_at else {
                info!("Upgrade.Chat order update isn't a cancellation");
                return Ok(());
            };
            let owner = Some(PurchaseOwner::User(user.id));
            let Some(purchase) = find_existing(state.pool(), Some(identifier), owner, &item).await?
            else {
                warn!(identifier = %identifier, "Cancelled Upgrade.Chat order is not stored");
                return Ok(());
            };
            purchases.set_expiry(purchase.id, Some(cancelled_at)).await?;
            info!(purchase_id = %purchase.id, expiry = %cancelled_at, "Upgrade.Chat expiry set");
            notification.subscription_expiry_time = Some(cancelled_at.timestamp());
        }
        EventType::OrderDeleted => {
            let owner = Some(PurchaseOwner::User(user.id));
            let Some(purchase) = find_existing(state.pool(), Some(identifier), owner, &item).await?
            else {
                warn!(identifier = %identifier, "Deleted Upgrade.Chat order is not stored");
                return Ok(());
            };
            purchases.delete(purchase.id).await?;
            info!(purchase_id = %purchase.id, "Deleted Upgrade.Chat purchase");
            notification.refund = true;
        }
        EventType::Unknown => {
            info!("Unhandled Upgrade.Chat event");
            return Ok(());
        }
    }

    state.notifier().dispatch(&item, &notification);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;
    use sqlx::PgPool;

    use crate::config::{UpgradeChatConfig, test_config};
    use crate::db::test_support::{count_by_identifier, item, seller};
    use crate::upgradechat::DEFAULT_PRODUCT_MAP;

    fn order_event(event_type: &str) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "data": {
                "payment_processor_record_id": "I-ORDER1",
                "purchased_at": "2024-02-01T12:30:00.000Z",
                "user": {"discord_id": "1234"},
                "order_items": [{"product": {"name": "MarriageBot Subscription Tier 1"}}]
            }
        }))
        .unwrap()
    }

    async fn setup(pool: &PgPool) -> (AppState, UpgradeChatClient) {
        let creator = seller(pool, None).await;
        item(pool, creator, "MarriageBot Tier 1").await;
        let state = AppState::new(test_config(), pool.clone()).unwrap();
        let client = UpgradeChatClient::new(
            reqwest::Client::new(),
            UpgradeChatConfig {
                client_id: "upgradechat-client".to_string(),
                client_secret: SecretString::from("upgradechat-client-secret"),
                product_map: ProductMap::parse(DEFAULT_PRODUCT_MAP).unwrap(),
            },
        );
        (state, client)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_redelivered_order_is_stored_once(pool: PgPool) {
        let (state, client) = setup(&pool).await;
        let created = order_event("order.created");

        handle_event(&state, &client, &created).await.unwrap();
        handle_event(&state, &client, &created).await.unwrap();

        assert_eq!(count_by_identifier(&pool, "purchases", "I-ORDER1").await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_deleted_order_removes_purchase(pool: PgPool) {
        let (state, client) = setup(&pool).await;
        handle_event(&state, &client, &order_event("order.created")).await.unwrap();

        handle_event(&state, &client, &order_event("order.deleted")).await.unwrap();

        assert_eq!(count_by_identifier(&pool, "purchases", "I-ORDER1").await, 0);
    }

    fn event(products: &[&str]) -> WebhookEvent {
        let items: Vec<_> = products
            .iter()
            .map(|name| json!({"product": {"name": name}}))
            .collect();
        serde_json::from_value(json!({
            "id": "evt",
            "type": "order.created",
            "data": {
                "payment_processor_record_id": "sub_1",
                "user": {"discord_id": "1"},
                "order_items": items
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_checkout_item_name() {
        let products = ProductMap::parse("MarriageBot Subscription Tier 1=MarriageBot Tier 1").unwrap();
        assert_eq!(
            checkout_item_name(&event(&["MarriageBot Subscription Tier 1"]), &products),
            Some("MarriageBot Tier 1")
        );
        assert_eq!(checkout_item_name(&event(&["Something else"]), &products), None);
        assert_eq!(
            checkout_item_name(
                &event(&["MarriageBot Subscription Tier 1", "MarriageBot Subscription Tier 1"]),
                &products
            ),
            None
        );
        assert_eq!(checkout_item_name(&event(&[]), &products), None);
    }
}

//! PayPal Instant Payment Notifications.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use voxelfox_core::PaymentProcessor;

use super::{find_existing, guild_id, owner_for, resolve_login_user};
use crate::db::{
    CheckoutItemRepository, PaymentUserRepository, PurchaseRepository, TransactionRepository,
};
use crate::error::Result;
use crate::models::{CheckoutItem, LoginUser, NewPurchase, NewTransaction};
use crate::paypal::{IpnEvent, IpnMessage, parse_amount_minor};
use crate::services::notifier::PurchaseNotification;
use crate::state::AppState;
use crate::stripe::Metadata;

/// How long a cancelled subscription keeps granting access after its last
/// payment.
const SUBSCRIPTION_GRACE_DAYS: i64 = 30;

/// Handle a verified IPN.
///
/// # Errors
///
/// Returns error if PayPal or the database fail.
#[instrument(skip(state, ipn), fields(txn_type = ?ipn.get("txn_type"), txn_id = ?ipn.get("txn_id")))]
pub async fn handle_ipn(state: &AppState, ipn: &IpnMessage) -> Result<()> {
    match ipn.event() {
        IpnEvent::ChargeCaptured => charge_captured(state, ipn).await,
        IpnEvent::SubscriptionCreated => subscription_created(state, ipn).await,
        IpnEvent::SubscriptionCancelled => subscription_cancelled(state, ipn).await,
        IpnEvent::Unhandled => {
            info!("Unhandled PayPal event");
            Ok(())
        }
    }
}

/// Whether a payment to `receiver_id` can be for an item sold by a seller
/// with PayPal ID `creator_paypal_id`.
fn creator_matches(creator_paypal_id: Option<&str>, receiver_id: Option<&str>) -> bool {
    matches!((creator_paypal_id, receiver_id), (Some(a), Some(b)) if a == b)
}

/// When a cancelled subscription stops granting access.
fn cancelled_expiry(last_payment: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    last_payment.unwrap_or(now) + Duration::days(SUBSCRIPTION_GRACE_DAYS)
}

/// The ledger row for the money an IPN moved, if it names a transaction.
fn transaction_for(ipn: &IpnMessage, item: &CheckoutItem, metadata: &Metadata) -> Option<NewTransaction> {
    let identifier = ipn.get("txn_id")?;
    let currency = ipn.get("mc_currency").unwrap_or("GBP").to_owned();
    let gross = ipn.get("mc_gross").and_then(parse_amount_minor).unwrap_or(0);
    let fee = ipn.get("mc_fee").and_then(parse_amount_minor).unwrap_or(0);
    let net = gross - fee;

    Some(NewTransaction {
        product_id: item.id,
        amount_gross: gross,
        amount_net: net,
        settle_amount: ipn
            .get("settle_amount")
            .and_then(parse_amount_minor)
            .unwrap_or(net),
        settle_currency: ipn
            .get("settle_currency")
            .map_or_else(|| currency.clone(), str::to_owned),
        currency,
        identifier: identifier.to_owned(),
        payment_processor: PaymentProcessor::PayPal,
        customer_email: ipn.get("payer_email").map(str::to_owned),
        metadata: serde_json::Value::Object(metadata.clone()),
        timestamp: ipn.payment_date().unwrap_or_else(Utc::now),
    })
}

/// Look up an item by name, keeping it only if this IPN's receiver sells it.
async fn item_for_receiver(
    state: &AppState,
    product_name: &str,
    receiver_id: Option<&str>,
) -> Result<Option<CheckoutItem>> {
    let Some(item) = CheckoutItemRepository::new(state.pool())
        .get_by_name(product_name)
        .await?
    else {
        info!(product = %product_name, "PayPal product is not a checkout item");
        return Ok(None);
    };

    let creator = PaymentUserRepository::new(state.pool())
        .get_by_id(item.creator_id)
        .await?;
    let creator_paypal_id = creator.as_ref().and_then(|c| c.paypal_id.as_deref());
    if !creator_matches(creator_paypal_id, receiver_id) {
        warn!(
            product = %product_name,
            receiver_id = ?receiver_id,
            "PayPal receiver doesn't sell this item"
        );
        return Ok(None);
    }
    Ok(Some(item))
}

fn notification_for(
    item: &CheckoutItem,
    metadata: &Metadata,
    user: Option<&LoginUser>,
) -> PurchaseNotification {
    let mut notification = PurchaseNotification::new(item, PaymentProcessor::PayPal);
    notification.metadata = metadata.clone();
    notification.discord_user_id = user.and_then(|u| u.discord_user_id.clone());
    notification.discord_guild_id = guild_id(metadata);
    notification
}

async fn subscription_metadata(state: &AppState, subscription_id: &str) -> Result<(Metadata, Option<DateTime<Utc>>)> {
    let subscription = state.paypal().get_subscription(subscription_id).await?;
    Ok((
        subscription.metadata(),
        subscription.last_payment_time(),
    ))
}

async fn charge_captured(state: &AppState, ipn: &IpnMessage) -> Result<()> {
    let refund = ipn.is_refund();
    let receiver_id = ipn.get("receiver_id");

    let mut metadata = ipn.custom_metadata();
    if let Some(recurring_payment_id) = ipn.get("recurring_payment_id") {
        let (subscription, _) = subscription_metadata(state, recurring_payment_id).await?;
        metadata.extend(subscription);
    }
    let user = resolve_login_user(state.pool(), &metadata).await?;

    let purchases = PurchaseRepository::new(state.pool());
    for product in ipn.products() {
        let Some(mut item) = item_for_receiver(state, &product.name, receiver_id).await? else {
            continue;
        };
        item.quantity = product.quantity;
        item.subscription = false;

        let mut notification = notification_for(&item, &metadata, user.as_ref());
        notification.refund = refund;
        state.notifier().dispatch(&item, &notification);

        if let Some(transaction) = transaction_for(ipn, &item, &metadata) {
            TransactionRepository::new(state.pool()).log(&transaction).await?;
        }

        let owner = user.as_ref().map(|u| owner_for(u.id, &metadata));
        if refund {
            let original = ipn.get("parent_txn_id");
            match find_existing(state.pool(), original, owner, &item).await? {
                Some(purchase) => {
                    purchases.delete(purchase.id).await?;
                    info!(purchase_id = %purchase.id, "Deleted refunded PayPal purchase");
                }
                None => info!(parent_txn_id = ?original, "Refunded PayPal purchase is not stored"),
            }
            continue;
        }

        let (Some(user), Some(txn_id)) = (user.as_ref(), ipn.get("txn_id")) else {
            warn!(item = %item.product_name, "PayPal payment has no buyer or transaction ID");
            continue;
        };
        let purchase = purchases
            .upsert(&NewPurchase {
                user_id: user.id,
                product_id: item.id,
                quantity: item.quantity,
                identifier: txn_id.to_owned(),
                discord_guild_id: guild_id(&metadata),
                cancel_url: None,
                expiry_time: None,
                timestamp: ipn.payment_date(),
            })
            .await?;
        info!(purchase_id = %purchase.id, item = %item.product_name, "Stored PayPal purchase");
    }

    Ok(())
}

async fn subscription_created(state: &AppState, ipn: &IpnMessage) -> Result<()> {
    let (Some(product_name), Some(subscription_id)) =
        (ipn.get("product_name"), ipn.get("recurring_payment_id"))
    else {
        warn!("PayPal subscription IPN has no product or subscription ID");
        return Ok(());
    };

    let (metadata, _) = subscription_metadata(state, subscription_id).await?;
    let Some(mut item) = item_for_receiver(state, product_name, ipn.get("receiver_id")).await? else {
        return Ok(());
    };
    item.subscription = true;
    let user = resolve_login_user(state.pool(), &metadata).await?;
    let cancel_url = state.paypal().subscription_cancel_url(subscription_id);

    let mut notification = notification_for(&item, &metadata, user.as_ref());
    notification.subscription_delete_url = Some(cancel_url.clone());
    state.notifier().dispatch(&item, &notification);

    let owner = user.as_ref().map(|u| owner_for(u.id, &metadata));
    if ipn.get("txn_type") == Some("recurring_payment") {
        if let Some(transaction) = transaction_for(ipn, &item, &metadata) {
            TransactionRepository::new(state.pool()).log(&transaction).await?;
        }
        // Renewals only log money; the purchase is stored once
        if find_existing(state.pool(), Some(subscription_id), owner, &item)
            .await?
            .is_some()
        {
            return Ok(());
        }
    }

    let Some(user) = user else {
        warn!(subscription = %subscription_id, "PayPal subscription has no buyer");
        return Ok(());
    };
    let purchase = PurchaseRepository::new(state.pool())
        .upsert(&NewPurchase {
            user_id: user.id,
            product_id: item.id,
            quantity: item.quantity,
            identifier: subscription_id.to_owned(),
            discord_guild_id: guild_id(&metadata),
            cancel_url: Some(cancel_url),
            expiry_time: None,
            timestamp: None,
        })
        .await?;
    info!(purchase_id = %purchase.id, "Stored PayPal subscription");
    Ok(())
}

async fn subscription_cancelled(state: &AppState, ipn: &IpnMessage) -> Result<()> {
    let (Some(product_name), Some(subscription_id)) =
        (ipn.get("product_name"), ipn.get("recurring_payment_id"))
    else {
        warn!("PayPal cancellation IPN has no product or subscription ID");
        return Ok(());
    };

    let (metadata, last_payment) = subscription_metadata(state, subscription_id).await?;
    let Some(mut item) = item_for_receiver(state, product_name, ipn.get("receiver_id")).await? else {
        return Ok(());
    };
    item.subscription = true;
    let user = resolve_login_user(state.pool(), &metadata).await?;
    let expiry_time = cancelled_expiry(last_payment, Utc::now());

    let mut notification = notification_for(&item, &metadata, user.as_ref());
    notification.subscription_expiry_time = Some(expiry_time.timestamp());
    state.notifier().dispatch(&item, &notification);

    let owner = user.as_ref().map(|u| owner_for(u.id, &metadata));
    let Some(purchase) = find_existing(state.pool(), Some(subscription_id), owner, &item).await?
    else {
        info!(subscription = %subscription_id, "Cancelled PayPal subscription is not stored");
        return Ok(());
    };
    PurchaseRepository::new(state.pool())
        .set_expiry(purchase.id, Some(expiry_time))
        .await?;
    info!(purchase_id = %purchase.id, expiry = %expiry_time, "PayPal subscription expiry set");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::db::test_support::{count_by_identifier, item, seller};
    use crate::models::checkout_item::fixtures;
    use crate::paypal::custom_metadata;
    use chrono::TimeZone;
    use sqlx::PgPool;

    const CART_IPN: &str = "txn_type=cart&txn_id=TXN1&receiver_id=MERCHANT1\
        &payment_status=Completed&item_name1=MarriageBot+Gold&quantity1=1\
        &item_name2=MarriageBot+Silver&quantity2=2&mc_gross=9.98&mc_fee=0.50\
        &mc_currency=GBP&custom=%7B%22discord_user_id%22%3A%221234%22%7D";

    const CART_REFUND_IPN: &str = "txn_id=TXN2&parent_txn_id=TXN1&receiver_id=MERCHANT1\
        &payment_status=Refunded&item_name1=MarriageBot+Gold&item_name2=MarriageBot+Silver\
        &mc_gross=-9.98&mc_fee=-0.50&mc_currency=GBP\
        &custom=%7B%22discord_user_id%22%3A%221234%22%7D";

    async fn cart_state(pool: &PgPool, merchant: &str) -> AppState {
        let creator = seller(pool, Some(merchant)).await;
        item(pool, creator, "MarriageBot Gold").await;
        item(pool, creator, "MarriageBot Silver").await;
        AppState::new(test_config(), pool.clone()).unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_cart_ipn_stores_every_item_once(pool: PgPool) {
        let state = cart_state(&pool, "MERCHANT1").await;
        let ipn = IpnMessage::parse(CART_IPN);

        handle_ipn(&state, &ipn).await.unwrap();
        handle_ipn(&state, &ipn).await.unwrap();

        assert_eq!(count_by_identifier(&pool, "purchases", "TXN1").await, 2);
        assert_eq!(count_by_identifier(&pool, "transactions", "TXN1").await, 2);

        let silver = CheckoutItemRepository::new(&pool)
            .get_by_name("MarriageBot Silver")
            .await
            .unwrap()
            .unwrap();
        let purchase = PurchaseRepository::new(&pool)
            .get_by_identifier("TXN1", silver.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(purchase.quantity, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_cart_refund_removes_every_item(pool: PgPool) {
        let state = cart_state(&pool, "MERCHANT1").await;
        handle_ipn(&state, &IpnMessage::parse(CART_IPN)).await.unwrap();

        handle_ipn(&state, &IpnMessage::parse(CART_REFUND_IPN)).await.unwrap();

        assert_eq!(count_by_identifier(&pool, "purchases", "TXN1").await, 0);
        assert_eq!(count_by_identifier(&pool, "transactions", "TXN2").await, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_ipn_for_another_receiver_is_ignored(pool: PgPool) {
        let state = cart_state(&pool, "SOMEONE_ELSE").await;

        handle_ipn(&state, &IpnMessage::parse(CART_IPN)).await.unwrap();

        assert_eq!(count_by_identifier(&pool, "purchases", "TXN1").await, 0);
        assert_eq!(count_by_identifier(&pool, "transactions", "TXN1").await, 0);
    }

    #[test]
    fn test_creator_matches() {
        assert!(creator_matches(Some("MERCHANT1"), Some("MERCHANT1")));
        assert!(!creator_matches(Some("MERCHANT1"), Some("MERCHANT2")));
        assert!(!creator_matches(None, Some("MERCHANT1")));
        assert!(!creator_matches(Some("MERCHANT1"), None));
    }

    #[test]
    fn test_cancelled_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let paid = Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap();
        assert_eq!(
            cancelled_expiry(Some(paid), now),
            Utc.with_ymd_and_hms(2024, 6, 19, 9, 0, 0).unwrap()
        );
        assert_eq!(
            cancelled_expiry(None, now),
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_transaction_for() {
        let item = fixtures::item("MarriageBot Gold");
        let ipn = IpnMessage::parse(
            "txn_id=8AB123&mc_gross=4.99&mc_fee=0.45&mc_currency=USD&payer_email=buyer%40example.com&payment_date=08%3A25%3A16+Jan+30%2C+2024+PST",
        );
        let transaction = transaction_for(&ipn, &item, &Metadata::new()).unwrap();
        assert_eq!(transaction.amount_gross, 499);
        assert_eq!(transaction.amount_net, 454);
        assert_eq!(transaction.settle_amount, 454);
        assert_eq!(transaction.currency, "USD");
        assert_eq!(transaction.settle_currency, "USD");
        assert_eq!(transaction.identifier, "8AB123");
        assert_eq!(transaction.customer_email.as_deref(), Some("buyer@example.com"));
        assert_eq!(
            transaction.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 30, 16, 25, 16).unwrap()
        );
    }

    #[test]
    fn test_transaction_for_refund_with_settlement() {
        let item = fixtures::item("MarriageBot Gold");
        let ipn = IpnMessage::parse(
            "txn_id=9XY&mc_gross=-4.99&mc_fee=-0.45&mc_currency=USD&settle_amount=-3.60&settle_currency=GBP",
        );
        let transaction = transaction_for(&ipn, &item, &Metadata::new()).unwrap();
        assert_eq!(transaction.amount_gross, -499);
        assert_eq!(transaction.amount_net, -454);
        assert_eq!(transaction.settle_amount, -360);
        assert_eq!(transaction.settle_currency, "GBP");
    }

    #[test]
    fn test_transaction_needs_txn_id() {
        let item = fixtures::item("MarriageBot Gold");
        let ipn = IpnMessage::parse("mc_gross=4.99");
        assert!(transaction_for(&ipn, &item, &Metadata::new()).is_none());
    }

    #[test]
    fn test_notification_carries_guild_from_metadata() {
        let item = fixtures::item("MarriageBot Gold");
        let metadata = custom_metadata(&[Some(r#"{"discord_guild_id": "42"}"#)]);
        let notification = notification_for(&item, &metadata, None);
        assert_eq!(notification.discord_guild_id, Some(42));
        assert_eq!(notification.source, PaymentProcessor::PayPal);
        assert!(notification.discord_user_id.is_none());
    }
}

//! Stripe webhook events.

use chrono::DateTime;
use tracing::{info, instrument, warn};

use voxelfox_core::{LoginUserId, PaymentProcessor};

use super::{find_existing, guild_id, merge_metadata, metadata_str, owner_for};
use crate::db::{CheckoutItemRepository, LoginUserRepository, PurchaseRepository};
use crate::error::Result;
use crate::models::{CheckoutItem, NewPurchase, Purchase};
use crate::services::notifier::PurchaseNotification;
use crate::state::AppState;
use crate::stripe::{Event, EventKind, EventObject, LineItem, Metadata, STRIPE_API_BASE};

/// Where the items of a checkout event are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LineItemSource<'a> {
    Invoice(&'a str),
    CheckoutSession(&'a str),
    PaymentIntent(&'a str),
}

fn line_item_source(object: &EventObject) -> Option<LineItemSource<'_>> {
    if let Some(invoice) = object.invoice.as_deref() {
        return Some(LineItemSource::Invoice(invoice));
    }
    match object.object.as_str() {
        "checkout.session" => Some(LineItemSource::CheckoutSession(&object.id)),
        "charge" => object
            .payment_intent
            .as_deref()
            .map(LineItemSource::PaymentIntent),
        _ => None,
    }
}

/// The subscription a checkout paid for, if it was one.
fn subscription_id<'a>(object: &'a EventObject, lines: &'a [LineItem]) -> Option<&'a str> {
    object
        .subscription
        .as_deref()
        .or_else(|| lines.iter().find_map(|line| line.subscription.as_deref()))
}

/// What a purchase is stored under.
///
/// A one-off checkout reaches us as both a completed session and a charge;
/// both carry the payment intent, so either stores the same purchase.
fn purchase_identifier<'a>(object: &'a EventObject, subscription_id: Option<&'a str>) -> &'a str {
    subscription_id
        .or(object.payment_intent.as_deref())
        .unwrap_or(&object.id)
}

/// Identifiers a refunded charge's purchase may be stored under, most
/// specific first.
fn refund_identifiers<'a>(object: &'a EventObject, subscription_id: Option<&'a str>) -> Vec<&'a str> {
    let refunded_charge = object
        .refunds
        .as_ref()
        .and_then(|refunds| refunds.data.first())
        .and_then(|refund| refund.charge.as_deref());

    let mut identifiers = Vec::with_capacity(4);
    for identifier in [
        Some(object.id.as_str()),
        refunded_charge,
        object.payment_intent.as_deref(),
        subscription_id,
    ]
    .into_iter()
        .flatten()
    {
        if !identifiers.contains(&identifier) {
            identifiers.push(identifier);
        }
    }
    identifiers
}

fn cancel_url(subscription_id: &str) -> String {
    format!("{STRIPE_API_BASE}/subscriptions/{subscription_id}")
}

/// Handle an authenticated Stripe event.
///
/// # Errors
///
/// Returns error if Stripe or the database fail; Stripe will redeliver.
#[instrument(skip(state, event), fields(event_id = %event.id, event_type = %event.event_type))]
pub async fn handle_event(state: &AppState, event: &Event) -> Result<()> {
    match event.kind() {
        EventKind::CheckoutSessionCompleted
        | EventKind::ChargeCaptured
        | EventKind::ChargeSucceeded
        | EventKind::ChargeRefunded => process_checkout(state, event).await,
        EventKind::SubscriptionDeleted => subscription_deleted(state, event).await,
        EventKind::Unhandled => {
            info!("Unhandled Stripe event");
            Ok(())
        }
    }
}

async fn customer_metadata(
    state: &AppState,
    customer: Option<&str>,
    account: Option<&str>,
) -> Result<Metadata> {
    match customer {
        Some(customer) => Ok(state.stripe().get_customer(customer, account).await?.metadata),
        None => Ok(Metadata::new()),
    }
}

async fn fetch_line_items(
    state: &AppState,
    source: &LineItemSource<'_>,
    account: Option<&str>,
) -> Result<Vec<LineItem>> {
    let stripe = state.stripe();
    let lines = match source {
        LineItemSource::Invoice(id) => stripe.get_invoice(id, account).await?.lines.data,
        LineItemSource::CheckoutSession(id) => {
            stripe.get_checkout_session_line_items(id, account).await?.data
        }
        LineItemSource::PaymentIntent(id) => {
            let intent = stripe.get_payment_intent_with_invoice(id, account).await?;
            match intent.invoice {
                Some(invoice) => invoice.lines.data,
                None => {
                    info!(payment_intent = %id, "Payment intent has no invoice");
                    Vec::new()
                }
            }
        }
    };
    Ok(lines)
}

async fn process_checkout(state: &AppState, event: &Event) -> Result<()> {
    let object = &event.data.object;
    let account = event.account.as_deref();
    let refund = event.kind() == EventKind::ChargeRefunded;

    // Subscription checkouts don't copy their metadata onto the customer
    if event.kind() == EventKind::CheckoutSessionCompleted
        && object.mode.as_deref() == Some("subscription")
        && let Some(customer) = object.customer.as_deref()
    {
        state
            .stripe()
            .set_customer_metadata(customer, &object.metadata, account)
            .await?;
    }

    let Some(source) = line_item_source(object) else {
        warn!(object = %object.object, "Can't find line items for Stripe object");
        return Ok(());
    };
    let lines = fetch_line_items(state, &source, account).await?;

    let items_repo = CheckoutItemRepository::new(state.pool());
    let mut purchased: Vec<CheckoutItem> = Vec::new();
    for line in &lines {
        let Some(price) = &line.price else {
            continue;
        };
        match items_repo.get_by_stripe_product_id(&price.product).await? {
            Some(mut item) => {
                item.subscription = price.is_recurring();
                item.quantity = line
                    .quantity
                    .and_then(|q| i32::try_from(q).ok())
                    .unwrap_or(1);
                purchased.push(item);
            }
            None => info!(product = %price.product, "Stripe product is not a checkout item"),
        }
    }
    if purchased.is_empty() {
        info!("No known checkout items in Stripe event");
        return Ok(());
    }

    let customer = customer_metadata(state, object.customer.as_deref(), account).await?;
    let metadata = merge_metadata([&customer, &object.metadata]);
    let subscription_id = subscription_id(object, &lines);

    for item in &purchased {
        let stored = if refund {
            refund_purchase(state, object, subscription_id, item).await?
        } else {
            store_purchase(state, object, subscription_id, item, &metadata).await?
        };
        let Some(purchase) = stored else {
            continue;
        };

        let discord_user_id = LoginUserRepository::new(state.pool())
            .get_by_id(purchase.user_id)
            .await?
            .and_then(|user| user.discord_user_id);

        let mut notification = PurchaseNotification::new(item, PaymentProcessor::Stripe);
        notification.refund = refund;
        notification.metadata = metadata.clone();
        notification.discord_user_id = discord_user_id;
        notification.discord_guild_id = purchase.discord_guild_id;
        if item.subscription {
            notification.subscription_delete_url = subscription_id.map(cancel_url);
        }
        state.notifier().dispatch(item, &notification);
    }

    Ok(())
}

/// Store a new purchase, or `None` when there is nothing to store.
async fn store_purchase(
    state: &AppState,
    object: &EventObject,
    subscription_id: Option<&str>,
    item: &CheckoutItem,
    metadata: &Metadata,
) -> Result<Option<Purchase>> {
    let Some(raw_user_id) = metadata_str(metadata, "user_id") else {
        info!(item = %item.product_name, "Stripe checkout has no user ID");
        return Ok(None);
    };
    let Ok(user_id) = raw_user_id.parse::<LoginUserId>() else {
        warn!(user_id = %raw_user_id, "Stripe checkout has a malformed user ID");
        return Ok(None);
    };
    let Some(user) = LoginUserRepository::new(state.pool()).get_by_id(user_id).await? else {
        warn!(user_id = %user_id, "Stripe checkout names an unknown user");
        return Ok(None);
    };

    let identifier = purchase_identifier(object, subscription_id);
    let owner = owner_for(user.id, metadata);
    if find_existing(state.pool(), Some(identifier), Some(owner), item)
        .await?
        .is_some()
    {
        info!(identifier = %identifier, "Ignoring purchase that is already stored");
        return Ok(None);
    }

    let purchase = PurchaseRepository::new(state.pool())
        .upsert(&NewPurchase {
            user_id: user.id,
            product_id: item.id,
            quantity: item.quantity,
            identifier: identifier.to_owned(),
            discord_guild_id: guild_id(metadata),
            cancel_url: subscription_id.map(cancel_url),
            expiry_time: None,
            timestamp: None,
        })
        .await?;
    info!(purchase_id = %purchase.id, item = %item.product_name, "Stored Stripe purchase");
    Ok(Some(purchase))
}

/// Delete the purchase a refund is for, returning what was deleted.
async fn refund_purchase(
    state: &AppState,
    object: &EventObject,
    subscription_id: Option<&str>,
    item: &CheckoutItem,
) -> Result<Option<Purchase>> {
    let purchases = PurchaseRepository::new(state.pool());
    for identifier in refund_identifiers(object, subscription_id) {
        if let Some(purchase) = purchases.get_by_identifier(identifier, item.id).await? {
            purchases.delete(purchase.id).await?;
            info!(purchase_id = %purchase.id, "Deleted refunded Stripe purchase");
            return Ok(Some(purchase));
        }
    }
    info!(charge = %object.id, "Cannot delete refunded purchase that is not stored");
    Ok(None)
}

async fn subscription_deleted(state: &AppState, event: &Event) -> Result<()> {
    let object = &event.data.object;
    let account = event.account.as_deref();

    let Some(subscription_item) = object.items.as_ref().and_then(|items| items.data.first()) else {
        warn!(subscription = %object.id, "Deleted subscription has no items");
        return Ok(());
    };
    let product = &subscription_item.price.product;
    let Some(mut item) = CheckoutItemRepository::new(state.pool())
        .get_by_stripe_product_id(product)
        .await?
    else {
        info!(product = %product, "Stripe product is not a checkout item");
        return Ok(());
    };
    item.subscription = true;
    if let Some(quantity) = subscription_item.quantity.and_then(|q| i32::try_from(q).ok()) {
        item.quantity = quantity;
    }

    let customer = customer_metadata(state, object.customer.as_deref(), account).await?;
    let metadata = merge_metadata([&customer, &object.metadata, &subscription_item.metadata]);

    let owner = metadata_str(&metadata, "user_id")
        .and_then(|id| id.parse::<LoginUserId>().ok())
        .map(|user_id| owner_for(user_id, &metadata));
    let Some(purchase) = find_existing(state.pool(), Some(&object.id), owner, &item).await? else {
        info!(subscription = %object.id, "Deleted subscription has no stored purchase");
        return Ok(());
    };

    let period_end = subscription_item
        .current_period_end
        .or(object.current_period_end);
    let expiry_time = period_end.and_then(|ts| DateTime::from_timestamp(ts, 0));
    PurchaseRepository::new(state.pool())
        .set_expiry(purchase.id, expiry_time)
        .await?;
    info!(purchase_id = %purchase.id, expiry = ?expiry_time, "Stripe subscription expiry set");

    let discord_user_id = LoginUserRepository::new(state.pool())
        .get_by_id(purchase.user_id)
        .await?
        .and_then(|user| user.discord_user_id);

    let mut notification = PurchaseNotification::new(&item, PaymentProcessor::Stripe);
    notification.metadata = metadata;
    notification.subscription_expiry_time = period_end;
    notification.discord_user_id = discord_user_id;
    notification.discord_guild_id = purchase.discord_guild_id;
    state.notifier().dispatch(&item, &notification);

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: serde_json::Value) -> EventObject {
        serde_json::from_value(value).unwrap()
    }

    fn line(subscription: Option<&str>) -> LineItem {
        serde_json::from_value(json!({
            "id": "il_1",
            "quantity": 1,
            "subscription": subscription,
            "price": {"id": "price_1", "product": "prod_1", "type": "recurring", "currency": "gbp"}
        }))
        .unwrap()
    }

    #[test]
    fn test_line_item_source_prefers_invoice() {
        let charge = object(json!({
            "id": "ch_1", "object": "charge", "invoice": "in_1", "payment_intent": "pi_1"
        }));
        assert_eq!(line_item_source(&charge), Some(LineItemSource::Invoice("in_1")));
    }

    #[test]
    fn test_line_item_source_by_object() {
        let session = object(json!({"id": "cs_1", "object": "checkout.session"}));
        assert_eq!(
            line_item_source(&session),
            Some(LineItemSource::CheckoutSession("cs_1"))
        );

        let charge = object(json!({"id": "ch_1", "object": "charge", "payment_intent": "pi_1"}));
        assert_eq!(
            line_item_source(&charge),
            Some(LineItemSource::PaymentIntent("pi_1"))
        );

        let bare_charge = object(json!({"id": "ch_2", "object": "charge"}));
        assert_eq!(line_item_source(&bare_charge), None);

        let other = object(json!({"id": "sub_1", "object": "subscription"}));
        assert_eq!(line_item_source(&other), None);
    }

    #[test]
    fn test_subscription_id() {
        let with_sub = object(json!({"id": "cs_1", "object": "checkout.session", "subscription": "sub_1"}));
        assert_eq!(subscription_id(&with_sub, &[line(Some("sub_2"))]), Some("sub_1"));

        let without = object(json!({"id": "ch_1", "object": "charge"}));
        assert_eq!(
            subscription_id(&without, &[line(None), line(Some("sub_2"))]),
            Some("sub_2")
        );
        assert_eq!(subscription_id(&without, &[line(None)]), None);
    }

    #[test]
    fn test_refund_identifiers() {
        let charge = object(json!({
            "id": "ch_1",
            "object": "charge",
            "refunds": {"data": [{"id": "re_1", "charge": "ch_1"}]}
        }));
        assert_eq!(refund_identifiers(&charge, Some("sub_1")), vec!["ch_1", "sub_1"]);
        assert_eq!(refund_identifiers(&charge, None), vec!["ch_1"]);

        let paid = object(json!({"id": "ch_2", "object": "charge", "payment_intent": "pi_2"}));
        assert_eq!(refund_identifiers(&paid, None), vec!["ch_2", "pi_2"]);
    }

    #[test]
    fn test_session_and_charge_share_purchase_identifier() {
        let session = object(json!({
            "id": "cs_1", "object": "checkout.session", "payment_intent": "pi_1"
        }));
        let charge = object(json!({
            "id": "ch_1", "object": "charge", "payment_intent": "pi_1", "invoice": "in_1"
        }));
        assert_eq!(purchase_identifier(&session, None), "pi_1");
        assert_eq!(purchase_identifier(&charge, None), "pi_1");
    }

    #[test]
    fn test_purchase_identifier_prefers_subscription() {
        let session = object(json!({
            "id": "cs_1", "object": "checkout.session", "payment_intent": "pi_1"
        }));
        assert_eq!(purchase_identifier(&session, Some("sub_1")), "sub_1");

        let bare = object(json!({"id": "cs_2", "object": "checkout.session"}));
        assert_eq!(purchase_identifier(&bare, None), "cs_2");
    }

    #[test]
    fn test_cancel_url() {
        assert_eq!(
            cancel_url("sub_1"),
            "https://api.stripe.com/v1/subscriptions/sub_1"
        );
    }
}

//! Upgrade.Chat webhook payload types.
//!
//! See: <https://upgrade.chat/developers/documentation>

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Webhook event kinds Upgrade.Chat sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum EventType {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.updated")]
    OrderUpdated,
    #[serde(rename = "order.deleted")]
    OrderDeleted,
    #[serde(other)]
    Unknown,
}

/// A webhook delivery.
///
/// The order arrives as `data` in current deliveries and as `body` in older
/// ones.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(default)]
    pub webhook_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    data: Option<Order>,
    #[serde(default)]
    body: Option<Order>,
}

impl WebhookEvent {
    /// The order this event is about.
    #[must_use]
    pub fn order(&self) -> Option<&Order> {
        self.data.as_ref().or(self.body.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub uuid: Option<String>,
    pub payment_processor_record_id: String,
    #[serde(default)]
    pub purchased_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_subscription: bool,
    pub user: User,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
}

impl Order {
    /// The single product this order is for, or `None` when it names zero
    /// or several.
    #[must_use]
    pub fn single_product_name(&self) -> Option<&str> {
        match self.order_items.as_slice() {
            [item] => Some(item.product.name.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(default)]
    pub discord_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItem {
    pub product: Product,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
}

/// Response from the event validation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct Validation {
    pub valid: bool,
}

/// OAuth client-credentials token response.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct AccessToken {
    pub access_token: String,
    /// Expiry as milliseconds since the Unix epoch, not a duration.
    pub access_token_expires_in: i64,
}

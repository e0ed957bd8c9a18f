//! Stripe payload types.
//!
//! Only the fields reconciliation reads are modelled; everything else in
//! Stripe's objects is ignored when deserializing.
//!
//! See: <https://docs.stripe.com/api/events/object>

use serde::Deserialize;

/// Free-form key/value metadata attached to Stripe objects.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Connected account the event happened on, if any.
    #[serde(default)]
    pub account: Option<String>,
    pub data: EventData,
}

/// Event payload wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

/// Event types that change purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    ChargeCaptured,
    ChargeSucceeded,
    ChargeRefunded,
    SubscriptionDeleted,
    Unhandled,
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "checkout.session.completed" => EventKind::CheckoutSessionCompleted,
            "charge.captured" => EventKind::ChargeCaptured,
            "charge.succeeded" => EventKind::ChargeSucceeded,
            "charge.refunded" => EventKind::ChargeRefunded,
            "customer.subscription.deleted" => EventKind::SubscriptionDeleted,
            _ => EventKind::Unhandled,
        }
    }
}

/// The object an event is about: a checkout session, charge, or subscription.
///
/// These share enough fields that a single lenient struct covers all three.
#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    pub id: String,
    /// Stripe's object type name, e.g. `checkout.session` or `charge`.
    pub object: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub invoice: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Checkout session mode: `payment` or `subscription`.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub refunds: Option<DataList<Refund>>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: Option<DataList<SubscriptionItem>>,
}

/// A paginated Stripe list. We only ever read the first page.
#[derive(Debug, Clone, Deserialize)]
pub struct DataList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// A refund on a charge.
#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    #[serde(default)]
    pub charge: Option<String>,
}

/// A price attached to a line or subscription item.
#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
    pub product: String,
    /// `one_time` or `recurring`.
    #[serde(rename = "type")]
    pub price_type: String,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    pub currency: String,
}

impl Price {
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.price_type == "recurring"
    }
}

/// A line on an invoice or checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    pub id: String,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub price: Option<Price>,
    /// Set on invoice lines generated by a subscription.
    #[serde(default)]
    pub subscription: Option<String>,
}

/// An invoice with its lines.
#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub lines: DataList<LineItem>,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// A payment intent fetched with `expand[]=invoice`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub invoice: Option<Invoice>,
}

/// A customer, for the metadata we store on them.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// An item on a subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub id: String,
    #[serde(default)]
    pub quantity: Option<i64>,
    pub price: Price,
    #[serde(default)]
    pub metadata: Metadata,
    /// Newer API versions report the billing period per item.
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

//! Ledger rows for money that moved.

use chrono::{DateTime, Utc};

use voxelfox_core::{CheckoutItemId, PaymentProcessor};

/// A transaction to log. Amounts are in the currency's minor unit.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub product_id: CheckoutItemId,
    pub amount_gross: i64,
    pub amount_net: i64,
    pub currency: String,
    pub settle_amount: i64,
    pub settle_currency: String,
    pub identifier: String,
    pub payment_processor: PaymentProcessor,
    pub customer_email: Option<String>,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

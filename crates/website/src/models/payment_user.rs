//! Accounts that sell checkout items.

use serde::Serialize;

use voxelfox_core::{LoginUserId, PaymentUserId};

/// `stripe_id` value meaning "our own Stripe account, not a connected one".
pub const PLATFORM_STRIPE_ACCOUNT: &str = "VFL";

/// A seller. Managers are login users with a payment user row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentUser {
    pub id: PaymentUserId,
    pub login_id: Option<LoginUserId>,
    pub stripe_id: Option<String>,
    pub paypal_id: Option<String>,
}

impl PaymentUser {
    /// Connected Stripe account to send as the `Stripe-Account` header.
    #[must_use]
    pub fn stripe_account(&self) -> Option<&str> {
        self.stripe_id
            .as_deref()
            .filter(|id| !id.is_empty() && *id != PLATFORM_STRIPE_ACCOUNT)
    }
}

//! Purchases of checkout items.

use chrono::{DateTime, Utc};
use serde::Serialize;

use voxelfox_core::{CheckoutItemId, LoginUserId, PurchaseId};

/// A stored purchase.
///
/// `identifier` is the processor's own ID for the thing that was bought
/// (subscription, checkout session, charge, PayPal transaction, Upgrade.Chat
/// order record) and is unique across all purchases.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Purchase {
    pub id: PurchaseId,
    pub user_id: LoginUserId,
    pub product_id: CheckoutItemId,
    pub quantity: i32,
    pub identifier: String,
    pub discord_guild_id: Option<i64>,
    pub cancel_url: Option<String>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl Purchase {
    /// A purchase grants access until its expiry time, if it has one.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time.is_none_or(|expiry| expiry > now)
    }
}

/// Who a purchase belongs to: a single user, or a whole Discord guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOwner {
    User(LoginUserId),
    Guild(i64),
}

/// Values written by an upsert.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub user_id: LoginUserId,
    pub product_id: CheckoutItemId,
    pub quantity: i32,
    pub identifier: String,
    pub discord_guild_id: Option<i64>,
    pub cancel_url: Option<String>,
    pub expiry_time: Option<DateTime<Utc>>,
    /// Defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn purchase(expiry_time: Option<DateTime<Utc>>) -> Purchase {
        Purchase {
            id: PurchaseId::new(Uuid::nil()),
            user_id: LoginUserId::new(Uuid::nil()),
            product_id: CheckoutItemId::new(Uuid::nil()),
            quantity: 1,
            identifier: "sub_123".to_string(),
            discord_guild_id: None,
            cancel_url: None,
            expiry_time,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_is_active() {
        let now = Utc::now();
        assert!(purchase(None).is_active(now));
        assert!(purchase(Some(now + Duration::days(3))).is_active(now));
        assert!(!purchase(Some(now - Duration::seconds(1))).is_active(now));
    }
}

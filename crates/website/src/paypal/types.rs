//! PayPal REST payload types.
//!
//! See: <https://developer.paypal.com/docs/api/subscriptions/v1/>

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::ipn::custom_metadata;
use crate::stripe::Metadata;

/// OAuth client-credentials token response.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct AccessToken {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// A billing subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// JSON metadata we attached when the subscription was created.
    #[serde(default)]
    pub custom_id: Option<String>,
    /// Older subscriptions carry their metadata here instead.
    #[serde(default)]
    pub custom: Option<String>,
    #[serde(default)]
    pub billing_info: Option<BillingInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingInfo {
    #[serde(default)]
    pub last_payment: Option<LastPayment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPayment {
    #[serde(default)]
    pub time: Option<String>,
}

impl Subscription {
    /// Checkout metadata from `custom_id` overlaid by `custom`.
    #[must_use]
    pub fn metadata(&self) -> Metadata {
        custom_metadata(&[self.custom_id.as_deref(), self.custom.as_deref()])
    }

    /// When the subscriber last paid, if PayPal reports it.
    #[must_use]
    pub fn last_payment_time(&self) -> Option<DateTime<Utc>> {
        let time = self.billing_info.as_ref()?.last_payment.as_ref()?.time.as_deref()?;
        DateTime::parse_from_rfc3339(time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_last_payment_time() {
        let subscription: Subscription = serde_json::from_value(serde_json::json!({
            "id": "I-BW452GLLEP1G",
            "status": "ACTIVE",
            "custom_id": "{\"discord_user_id\": \"1234\"}",
            "billing_info": {"last_payment": {"time": "2024-03-01T10:00:00Z"}}
        }))
        .unwrap();
        assert_eq!(
            subscription.last_payment_time(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_metadata_merges_custom_fields() {
        let subscription: Subscription = serde_json::from_value(serde_json::json!({
            "id": "I-1",
            "custom_id": "{\"discord_user_id\": \"1234\", \"user_id\": \"a\"}",
            "custom": "{\"discord_guild_id\": \"42\", \"user_id\": \"b\"}"
        }))
        .unwrap();
        let metadata = subscription.metadata();
        assert_eq!(metadata["discord_user_id"], "1234");
        assert_eq!(metadata["discord_guild_id"], "42");
        assert_eq!(metadata["user_id"], "b");
    }

    #[test]
    fn test_last_payment_time_missing() {
        let subscription: Subscription =
            serde_json::from_value(serde_json::json!({"id": "I-1", "billing_info": {}})).unwrap();
        assert_eq!(subscription.last_payment_time(), None);
    }
}

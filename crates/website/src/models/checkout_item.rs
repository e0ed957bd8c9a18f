//! Purchasable products.

use serde::{Deserialize, Serialize};

use voxelfox_core::{CheckoutItemId, PaymentUserId, RequiredLogins};

/// A product that can be bought through Stripe, PayPal, or Upgrade.Chat.
///
/// Serializes without the notification webhook or its authorization so the
/// row can be returned from public endpoints.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CheckoutItem {
    pub id: CheckoutItemId,
    pub creator_id: PaymentUserId,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
    pub subscription: bool,
    pub stripe_product_id: String,
    pub stripe_price_id: String,
    pub paypal_plan_id: Option<String>,
    #[serde(skip_serializing)]
    pub transaction_webhook: Option<String>,
    #[serde(skip_serializing)]
    pub transaction_webhook_authorization: String,
    pub product_group: Option<String>,
    pub per_guild: bool,
    pub multiple: bool,
    pub description: Option<String>,
    pub quantity: i32,
    #[sqlx(try_from = "i32")]
    pub required_logins: RequiredLogins,
    pub base_product_id: Option<CheckoutItemId>,
}

impl CheckoutItem {
    /// The item this one is a variant of, or itself.
    #[must_use]
    pub fn base_id(&self) -> CheckoutItemId {
        self.base_product_id.unwrap_or(self.id)
    }

    /// Description rendered from markdown to HTML.
    #[must_use]
    pub fn description_html(&self) -> String {
        self.description
            .as_deref()
            .map(|md| comrak::markdown_to_html(md, &comrak::Options::default()))
            .unwrap_or_default()
    }
}

/// Fields needed to create or replace a checkout item by name.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCheckoutItem {
    pub creator_id: PaymentUserId,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
    pub subscription: bool,
    pub stripe_product_id: String,
    pub stripe_price_id: String,
    pub paypal_plan_id: Option<String>,
    pub transaction_webhook: Option<String>,
    pub transaction_webhook_authorization: String,
    pub product_group: Option<String>,
}

/// A manager's edit to one of their own items.
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutItemUpdate {
    pub product_name: Option<String>,
    pub description: Option<String>,
    pub product_group: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub paypal_plan_id: Option<String>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use uuid::Uuid;

    /// A minimal item for service and route tests.
    pub(crate) fn item(name: &str) -> CheckoutItem {
        CheckoutItem {
            id: CheckoutItemId::new(Uuid::from_u128(1)),
            creator_id: PaymentUserId::new(Uuid::from_u128(2)),
            product_name: name.to_string(),
            success_url: "https://voxelfox.co.uk/success".to_string(),
            cancel_url: "https://voxelfox.co.uk/cancel".to_string(),
            subscription: false,
            stripe_product_id: "prod_test".to_string(),
            stripe_price_id: "price_test".to_string(),
            paypal_plan_id: None,
            transaction_webhook: Some("https://bot.example.net/webhook".to_string()),
            transaction_webhook_authorization: "webhook-auth".to_string(),
            product_group: Some("MarriageBot".to_string()),
            per_guild: false,
            multiple: false,
            description: None,
            quantity: 1,
            required_logins: RequiredLogins::default(),
            base_product_id: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::fixtures::item;
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_serialization_hides_webhook_credentials() {
        let json = serde_json::to_value(item("MarriageBot Gold")).unwrap();
        assert_eq!(json["product_name"], "MarriageBot Gold");
        assert!(json.get("transaction_webhook").is_none());
        assert!(json.get("transaction_webhook_authorization").is_none());
    }

    #[test]
    fn test_base_id() {
        let mut variant = item("Gold (yearly)");
        assert_eq!(variant.base_id(), variant.id);

        let base = CheckoutItemId::new(Uuid::from_u128(99));
        variant.base_product_id = Some(base);
        assert_eq!(variant.base_id(), base);
    }

    #[test]
    fn test_description_html() {
        let mut gold = item("Gold");
        assert_eq!(gold.description_html(), "");

        gold.description = Some("**Shiny** things".to_string());
        assert!(gold.description_html().contains("<strong>Shiny</strong>"));
    }
}

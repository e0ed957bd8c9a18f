//! Outbound purchase notifications.
//!
//! Each checkout item can name a webhook that is told about purchases,
//! refunds, and subscription changes for it. Delivery runs on a detached
//! task so a slow or failing receiver never holds up the payment webhook
//! that triggered it.

use reqwest::Client;
use tracing::{info, instrument, warn};

use voxelfox_core::PaymentProcessor;

use crate::models::CheckoutItem;
use crate::stripe::Metadata;

/// The payload sent to an item's transaction webhook.
#[derive(Debug, Clone)]
pub struct PurchaseNotification {
    pub product_name: String,
    pub quantity: i32,
    pub refund: bool,
    pub subscription: bool,
    /// Unix seconds when a cancelled subscription stops granting access.
    pub subscription_expiry_time: Option<i64>,
    pub source: PaymentProcessor,
    pub subscription_delete_url: Option<String>,
    pub discord_user_id: Option<String>,
    pub discord_guild_id: Option<i64>,
    /// Whatever the buyer's checkout carried; flattened into the payload.
    pub metadata: Metadata,
}

impl PurchaseNotification {
    /// A notification for `item` with nothing but the product filled in.
    #[must_use]
    pub fn new(item: &CheckoutItem, source: PaymentProcessor) -> Self {
        Self {
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            refund: false,
            subscription: item.subscription,
            subscription_expiry_time: None,
            source,
            subscription_delete_url: None,
            discord_user_id: None,
            discord_guild_id: None,
            metadata: Metadata::new(),
        }
    }

    /// The JSON body.
    ///
    /// Metadata goes in first so it can't overwrite the normalized keys.
    /// Discord IDs only replace metadata values when we know them.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = self.metadata.clone();
        body.insert("product_name".into(), self.product_name.clone().into());
        body.insert("quantity".into(), self.quantity.into());
        body.insert("refund".into(), self.refund.into());
        body.insert("subscription".into(), self.subscription.into());
        body.insert(
            "subscription_expiry_time".into(),
            self.subscription_expiry_time.into(),
        );
        body.insert("source".into(), self.source.as_str().into());
        body.insert(
            "subscription_delete_url".into(),
            self.subscription_delete_url.clone().into(),
        );
        if let Some(discord_user_id) = &self.discord_user_id {
            body.insert("discord_user_id".into(), discord_user_id.clone().into());
        }
        if let Some(discord_guild_id) = self.discord_guild_id {
            body.insert("discord_guild_id".into(), discord_guild_id.into());
        }
        serde_json::Value::Object(body)
    }
}

/// Sends purchase notifications to checkout item webhooks.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
}

impl Notifier {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Send `notification` to `item`'s webhook in the background.
    ///
    /// Items without a webhook are skipped.
    pub fn dispatch(&self, item: &CheckoutItem, notification: &PurchaseNotification) {
        let Some(url) = item.transaction_webhook.clone() else {
            return;
        };
        let client = self.client.clone();
        let authorization = item.transaction_webhook_authorization.clone();
        let body = notification.to_json();
        tokio::spawn(async move {
            send(&client, &url, &authorization, &body).await;
        });
    }
}

#[instrument(skip(client, authorization, body))]
async fn send(client: &Client, url: &str, authorization: &str, body: &serde_json::Value) {
    info!(body = %body, "Sending purchase notification");
    match client
        .post(url)
        .header(reqwest::header::AUTHORIZATION, authorization)
        .json(body)
        .send()
        .await
    {
        Ok(response) => {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                info!(status = %status, body = %text, "Purchase notification delivered");
            } else {
                warn!(status = %status, body = %text, "Purchase notification rejected");
            }
        }
        Err(e) => warn!(error = %e, "Purchase notification failed"),
    }
}

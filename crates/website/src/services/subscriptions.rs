//! Cancelling subscriptions through whichever processor sold them.
//!
//! A purchase's `cancel_url` is the processor's own API URL for cancelling
//! it, so the URL alone says who to call.

use reqwest::StatusCode;
use tracing::{info, instrument};

use crate::db::PaymentUserRepository;
use crate::error::Result;
use crate::models::CheckoutItem;
use crate::state::AppState;

/// Who a cancel URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTarget {
    PayPal,
    Stripe,
    /// Not a processor URL; the purchase is managed by us alone.
    Local,
}

impl CancelTarget {
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
        match host.as_deref() {
            Some(h) if h == "paypal.com" || h.ends_with(".paypal.com") => Self::PayPal,
            Some(h) if h == "stripe.com" || h.ends_with(".stripe.com") => Self::Stripe,
            _ => Self::Local,
        }
    }
}

/// Cancel the subscription at `cancel_url` with its processor.
///
/// Stripe calls act as `item`'s seller when it has a connected account.
/// Returns the processor's status code, or `None` for local URLs, which have
/// nobody to call.
///
/// # Errors
///
/// Returns error if the processor can't be reached.
#[instrument(skip(state, item), fields(item = %item.product_name))]
pub async fn cancel(
    state: &AppState,
    item: &CheckoutItem,
    cancel_url: &str,
) -> Result<Option<StatusCode>> {
    let status = match CancelTarget::from_url(cancel_url) {
        CancelTarget::PayPal => state.paypal().cancel_subscription(cancel_url).await?,
        CancelTarget::Stripe => {
            let creator = PaymentUserRepository::new(state.pool())
                .get_by_id(item.creator_id)
                .await?;
            let account = creator.as_ref().and_then(|c| c.stripe_account());
            state
                .stripe()
                .cancel_subscription(cancel_url, account)
                .await?
        }
        CancelTarget::Local => return Ok(None),
    };
    info!(status = %status, "Subscription cancel requested");
    Ok(Some(status))
}

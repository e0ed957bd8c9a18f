//! Stripe-related errors.

use thiserror::Error;

/// Errors that can occur when interacting with Stripe.
#[derive(Debug, Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("Stripe request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Stripe returned a non-success status. `body` is Stripe's error JSON.
    #[error("Stripe API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// Failed to parse response.
    #[error("Stripe response error: {0}")]
    Response(String),
}

//! PayPal-related errors.

use thiserror::Error;

/// Errors that can occur when interacting with PayPal.
#[derive(Debug, Error)]
pub enum PayPalError {
    /// HTTP request failed.
    #[error("PayPal request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// PayPal returned a non-success status.
    #[error("PayPal API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("PayPal response error: {0}")]
    Response(String),
}

//! PayPal integration: Instant Payment Notifications and the REST API.
//!
//! This module provides:
//! - [`IpnMessage`] parsing and classification of IPN posts
//! - [`PayPalClient`] for IPN verification, subscriptions, and cancellation
//!
//! # Flow
//!
//! 1. PayPal posts an urlencoded IPN to us
//! 2. We echo it back to PayPal's IPN endpoint, which answers `VERIFIED`
//! 3. The message is classified by `txn_type` and reconciled

mod client;
mod error;
mod ipn;
mod types;

pub use client::PayPalClient;
pub use error::PayPalError;
pub use ipn::{
    IpnEvent, IpnMessage, IpnProduct, custom_metadata, ipn_verify_url, parse_amount_minor,
    parse_payment_date,
};
pub use types::{BillingInfo, LastPayment, Subscription};

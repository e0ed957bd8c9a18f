//! Stripe integration for checkout sessions and purchase webhooks.
//!
//! This module provides:
//! - [`StripeClient`] for the handful of REST calls reconciliation needs
//! - Payload types for the webhook events we handle
//! - Webhook signature verification
//! - Nested form encoding for Stripe's `a[b][0]=c` parameter style

mod client;
mod error;
mod form;
mod signature;
mod types;

pub use client::{STRIPE_API_BASE, StripeClient};
pub use error::StripeError;
pub use form::form_encode;
pub use signature::{SignatureError, uses_connect_secret, verify_signature};
pub use types::{
    Customer, DataList, Event, EventKind, EventObject, Invoice, LineItem, Metadata,
    PaymentIntent, Price, Refund, SubscriptionItem,
};

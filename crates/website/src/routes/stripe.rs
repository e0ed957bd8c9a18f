//! Stripe checkout creation and webhook receiver.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use voxelfox_core::CheckoutItemId;

use crate::db::{CheckoutItemRepository, PaymentUserRepository};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::CheckoutItem;
use crate::services::reconcile;
use crate::state::AppState;
use crate::stripe::{Event, Metadata, StripeError, uses_connect_secret, verify_signature};

const CHECKOUT_PAY_URL: &str = "https://checkout.stripe.com/pay";
const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Session parameters for buying `quantity` of `item`.
///
/// `metadata` goes on the session and on whatever it creates (the
/// subscription, or the invoice for one-off payments) so webhooks for any
/// of them can find the buyer.
fn session_params(item: &CheckoutItem, quantity: i64, metadata: &Metadata) -> Value {
    let mode = if item.subscription { "subscription" } else { "payment" };
    let mut params = json!({
        "cancel_url": item.cancel_url,
        "success_url": item.success_url,
        "payment_method_types": ["card"],
        "mode": mode,
        "line_items": [{
            "price": item.stripe_price_id,
            "quantity": quantity,
        }],
        "metadata": metadata,
    });
    if item.subscription {
        params["subscription_data"] = json!({ "metadata": metadata });
    } else {
        params["invoice_creation"] = json!({
            "enabled": true,
            "invoice_data": { "metadata": metadata },
        });
    }
    params
}

fn parse_quantity(value: Option<Value>) -> std::result::Result<i64, AppError> {
    match value {
        None | Some(Value::Null) => Ok(1),
        Some(Value::Number(n)) => n
            .as_i64()
            .filter(|q| *q > 0)
            .ok_or_else(|| AppError::BadRequest("Invalid quantity".to_string())),
        Some(Value::String(s)) => s
            .parse()
            .ok()
            .filter(|q: &i64| *q > 0)
            .ok_or_else(|| AppError::BadRequest("Invalid quantity".to_string())),
        Some(_) => Err(AppError::BadRequest("Invalid quantity".to_string())),
    }
}

/// Create a Stripe checkout session for a checkout item.
///
/// Everything in the request besides `product_id` and `quantity` becomes
/// checkout metadata.
///
/// # Errors
///
/// Returns 400 for malformed requests, 404 for unknown items, and 500 with
/// Stripe's error body when Stripe rejects the session.
#[instrument(skip_all)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response> {
    let mut metadata: Metadata = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Invalid data".to_string()))?;

    let product_id = metadata.remove("product_id");
    let quantity = parse_quantity(metadata.remove("quantity"))?;
    let Some(user_id) = metadata.get("user_id").cloned() else {
        return Err(AppError::BadRequest("Missing user ID".to_string()));
    };
    let product_id: CheckoutItemId = product_id
        .as_ref()
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("Missing product ID".to_string()))?
        .parse()
        .map_err(|_| AppError::NotFound("checkout item".to_string()))?;

    let item = CheckoutItemRepository::new(state.pool())
        .get_by_id(product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("checkout item".to_string()))?;
    let creator = PaymentUserRepository::new(state.pool())
        .get_by_id(item.creator_id)
        .await?;
    let account = creator.as_ref().and_then(|c| c.stripe_account());

    let params = session_params(&item, quantity, &metadata);
    let mut session = match state.stripe().create_checkout_session(&params, account).await {
        Ok(session) => session,
        Err(StripeError::Api { status, body }) => {
            warn!(status, item = %item.product_name, "Stripe rejected checkout session");
            let body = serde_json::from_str(&body).unwrap_or_else(|_| json!({ "error": body }));
            return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(customer) = session.get("customer").and_then(Value::as_str) {
        let mut customer_metadata = Map::new();
        customer_metadata.insert("user_id".to_string(), user_id);
        state
            .stripe()
            .set_customer_metadata(customer, &customer_metadata, account)
            .await?;
    }

    let session_id = session
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AppError::Stripe(StripeError::Response("session has no ID".to_string())))?;
    session["href"] = json!(format!("{CHECKOUT_PAY_URL}/{session_id}"));
    info!(session_id = %session_id, item = %item.product_name, "Checkout session created");

    Ok(Json(session).into_response())
}

/// Receive a Stripe webhook event.
///
/// The signature is checked against the raw body before anything is
/// parsed into an event.
///
/// # Errors
///
/// Returns 400 for bad signatures. Returns 5xx when reconciliation fails so
/// Stripe redelivers.
#[instrument(skip_all)]
pub async fn purchase_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing signature".to_string()))?;
    let raw: Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Invalid JSON".to_string()))?;

    let config = &state.config().stripe;
    let secret = if uses_connect_secret(&raw) {
        &config.webhook_signing_secret
    } else {
        &config.account_webhook_signing_secret
    };
    if let Err(e) = verify_signature(
        signature,
        &body,
        secret.expose_secret(),
        config.webhook_tolerance_secs,
        Utc::now().timestamp(),
    ) {
        warn!(error = %e, "Rejected Stripe webhook signature");
        return Err(AppError::BadRequest("Invalid signature".to_string()));
    }

    let event: Event = match serde_json::from_value(raw) {
        Ok(event) => event,
        Err(e) => {
            // Signed by Stripe but not shaped like anything we handle
            warn!(error = %e, "Unreadable Stripe event acknowledged");
            return Ok(StatusCode::OK);
        }
    };
    add_breadcrumb(
        "stripe",
        "Webhook received",
        Some(&[
            ("event_id", event.id.as_str()),
            ("event_type", event.event_type.as_str()),
        ]),
    );

    reconcile::stripe::handle_event(&state, &event).await?;
    Ok(StatusCode::OK)
}

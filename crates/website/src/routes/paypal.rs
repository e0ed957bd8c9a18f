//! PayPal IPN receiver.

use axum::{extract::State, http::StatusCode};
use tracing::{debug, info, instrument};

use crate::error::{Result, add_breadcrumb};
use crate::paypal::IpnMessage;
use crate::services::reconcile;
use crate::state::AppState;

/// Receive an IPN message.
///
/// Messages are echoed back to PayPal for verification first. Unverified
/// ones are acknowledged and dropped so PayPal stops resending them.
///
/// # Errors
///
/// Returns 5xx when PayPal can't be reached or reconciliation fails, so
/// PayPal resends the message.
#[instrument(skip_all)]
pub async fn purchase_ipn(State(state): State<AppState>, body: String) -> Result<StatusCode> {
    let message = IpnMessage::parse(&body);
    let txn_id = message.get("txn_id").unwrap_or_default().to_owned();
    debug!(txn_id = %txn_id, txn_type = ?message.get("txn_type"), "IPN received");

    if !state.paypal().verify_ipn(&body, message.is_sandbox()).await? {
        info!(txn_id = %txn_id, "Dropping unverified IPN");
        return Ok(StatusCode::OK);
    }
    add_breadcrumb("paypal", "Verified IPN", Some(&[("txn_id", txn_id.as_str())]));

    reconcile::paypal::handle_ipn(&state, &message).await?;
    Ok(StatusCode::OK)
}

//! Upgrade.Chat webhook receiver.

use axum::{body::Bytes, extract::State, http::StatusCode};
use tracing::{info, instrument, warn};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::services::reconcile;
use crate::state::AppState;
use crate::upgradechat::WebhookEvent;

/// Receive an Upgrade.Chat event.
///
/// Upgrade.Chat expects a 201 for every delivery it shouldn't retry.
/// Events are checked with Upgrade.Chat's API before being trusted.
///
/// # Errors
///
/// Returns 404 when the integration isn't configured and 400 for bodies that
/// aren't events.
#[instrument(skip_all)]
pub async fn purchase_webhook(State(state): State<AppState>, body: Bytes) -> Result<StatusCode> {
    let Some(client) = state.upgradechat() else {
        return Err(AppError::NotFound("Upgrade.Chat is not configured".to_string()));
    };
    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Unreadable Upgrade.Chat webhook");
        AppError::BadRequest("Invalid event".to_string())
    })?;

    if !client.validate_event(&event.id).await? {
        info!(event_id = %event.id, "Dropping invalid Upgrade.Chat event");
        return Ok(StatusCode::CREATED);
    }
    add_breadcrumb(
        "upgradechat",
        "Validated event",
        Some(&[("event_id", event.id.as_str())]),
    );

    reconcile::upgradechat::handle_event(&state, client, &event).await?;
    Ok(StatusCode::CREATED)
}

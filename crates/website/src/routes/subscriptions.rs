//! Backend-initiated subscription cancellation.
//!
//! Bots cancel their users' subscriptions here, authenticating with the
//! same secret the website sends on their item's notification webhook.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::db::CheckoutItemRepository;
use crate::error::Result;
use crate::services::subscriptions;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct CancelRequest {
    #[serde(default)]
    product_name: String,
    #[serde(default)]
    cancel_url: String,
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Cancel a subscription on behalf of a checkout item's owner.
///
/// # Errors
///
/// Returns error if the database or the processor can't be reached.
#[instrument(skip_all)]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let request: CancelRequest = serde_json::from_slice(&body).unwrap_or_default();
    if auth.is_empty() || request.product_name.is_empty() || request.cancel_url.is_empty() {
        return Ok(error_json(StatusCode::BAD_REQUEST, "Missing data"));
    }

    let item = CheckoutItemRepository::new(state.pool())
        .get_by_name(&request.product_name)
        .await?
        .filter(|item| item.transaction_webhook_authorization == auth);
    let Some(item) = item else {
        warn!(product_name = %request.product_name, "Cancel request with bad authorization");
        return Ok(error_json(StatusCode::UNAUTHORIZED, "Invalid auth header."));
    };

    let Some(status) = subscriptions::cancel(&state, &item, &request.cancel_url).await? else {
        return Ok(error_json(StatusCode::BAD_REQUEST, "Invalid cancel URL."));
    };
    info!(product_name = %item.product_name, status = %status, "Backend cancel forwarded");

    Ok(Json(json!({ "error": "", "status": status.as_u16() })).into_response())
}

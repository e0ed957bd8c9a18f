//! Checkout item management for managers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use voxelfox_core::PaymentUserId;

use crate::db::{CheckoutItemRepository, RepositoryError};
use crate::error::Result;
use crate::middleware::RequireManager;
use crate::models::{CheckoutItem, NewCheckoutItem};
use crate::state::AppState;

/// Keys every create request must carry, even when empty.
const REQUIRED_KEYS: [&str; 9] = [
    "product_name",
    "success_url",
    "cancel_url",
    "subscription",
    "stripe_product_id",
    "stripe_price_id",
    "paypal_plan_id",
    "transaction_webhook",
    "transaction_webhook_authorization",
];

/// Checkout items page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout_items.html")]
pub struct CheckoutItemsTemplate {
    pub items: Vec<CheckoutItem>,
}

/// List every checkout item.
///
/// # Errors
///
/// Returns error if the database query fails.
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    _manager: RequireManager,
) -> Result<impl IntoResponse> {
    let items = CheckoutItemRepository::new(state.pool()).list_all().await?;
    Ok(CheckoutItemsTemplate { items })
}

fn text(data: &Map<String, Value>, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn optional_text(data: &Map<String, Value>, key: &str) -> Option<String> {
    Some(text(data, key)).filter(|s| !s.is_empty())
}

/// Turn a create request into a new item.
///
/// Returns the missing keys when the request is incomplete.
fn parse_new_item(
    data: &Map<String, Value>,
    creator_id: PaymentUserId,
) -> std::result::Result<NewCheckoutItem, Vec<&'static str>> {
    let missing: Vec<_> = REQUIRED_KEYS
        .into_iter()
        .filter(|key| !data.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(missing);
    }

    let subscription = match data.get("subscription") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    };

    Ok(NewCheckoutItem {
        creator_id,
        product_name: text(data, "product_name"),
        success_url: text(data, "success_url"),
        cancel_url: text(data, "cancel_url"),
        subscription,
        stripe_product_id: text(data, "stripe_product_id"),
        stripe_price_id: text(data, "stripe_price_id"),
        paypal_plan_id: optional_text(data, "paypal_plan_id"),
        transaction_webhook: optional_text(data, "transaction_webhook"),
        transaction_webhook_authorization: text(data, "transaction_webhook_authorization"),
        product_group: optional_text(data, "product_group"),
    })
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Create a checkout item, or replace the one with the same name.
///
/// # Errors
///
/// Returns error if the database query fails.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    manager: RequireManager,
    body: Bytes,
) -> Result<Response> {
    let Ok(data) = serde_json::from_slice::<Map<String, Value>>(&body) else {
        return Ok(error_json(StatusCode::BAD_REQUEST, "Invalid data."));
    };
    let new_item = match parse_new_item(&data, manager.payment_user.id) {
        Ok(item) => item,
        Err(missing) => {
            return Ok(error_json(
                StatusCode::BAD_REQUEST,
                &format!("Missing keys: {}", missing.join(", ")),
            ));
        }
    };

    let item = match CheckoutItemRepository::new(state.pool())
        .upsert_by_name(&new_item)
        .await
    {
        Ok(item) => item,
        Err(RepositoryError::Conflict(reason)) => {
            warn!(product_name = %new_item.product_name, %reason, "Checkout item not saved");
            return Ok(error_json(
                StatusCode::FORBIDDEN,
                "That product name belongs to another seller.",
            ));
        }
        Err(e) => return Err(e.into()),
    };
    state.portal_cache().invalidate_all().await;
    info!(item_id = %item.id, product_name = %item.product_name, "Checkout item saved");

    Ok(Json(json!({ "error": null })).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn creator() -> PaymentUserId {
        PaymentUserId::new(Uuid::from_u128(3))
    }

    fn full_request() -> Map<String, Value> {
        json!({
            "product_name": "MarriageBot Gold",
            "success_url": "https://marriagebot.xyz/thanks",
            "cancel_url": "https://marriagebot.xyz",
            "subscription": "1",
            "stripe_product_id": "prod_1",
            "stripe_price_id": "price_1",
            "paypal_plan_id": "",
            "transaction_webhook": "",
            "transaction_webhook_authorization": "secret"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_parse_new_item() {
        let item = parse_new_item(&full_request(), creator()).unwrap();
        assert_eq!(item.product_name, "MarriageBot Gold");
        assert!(item.subscription);
        assert_eq!(item.paypal_plan_id, None);
        assert_eq!(item.transaction_webhook, None);
        assert_eq!(item.transaction_webhook_authorization, "secret");
        assert_eq!(item.creator_id, creator());
    }

    #[test]
    fn test_parse_subscription_flag() {
        let mut data = full_request();
        data.insert("subscription".to_string(), json!(true));
        assert!(parse_new_item(&data, creator()).unwrap().subscription);

        data.insert("subscription".to_string(), json!("0"));
        assert!(!parse_new_item(&data, creator()).unwrap().subscription);

        data.insert("subscription".to_string(), json!("true"));
        assert!(!parse_new_item(&data, creator()).unwrap().subscription);
    }

    #[test]
    fn test_parse_reports_missing_keys() {
        let mut data = full_request();
        data.remove("stripe_price_id");
        data.remove("product_name");
        assert_eq!(
            parse_new_item(&data, creator()).unwrap_err(),
            vec!["product_name", "stripe_price_id"]
        );
    }

    #[test]
    fn test_parse_keeps_plan_and_webhook_when_set() {
        let mut data = full_request();
        data.insert("paypal_plan_id".to_string(), json!("P-123"));
        data.insert(
            "transaction_webhook".to_string(),
            json!("https://bot.example.net/hook"),
        );
        let item = parse_new_item(&data, creator()).unwrap();
        assert_eq!(item.paypal_plan_id.as_deref(), Some("P-123"));
        assert_eq!(
            item.transaction_webhook.as_deref(),
            Some("https://bot.example.net/hook")
        );
    }
}

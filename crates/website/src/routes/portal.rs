//! Customer portal: product pages and the purchase APIs bots call.

use std::collections::HashMap;
use std::time::Duration;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use voxelfox_core::{CheckoutItemId, PaymentUserId, Price, PurchaseId};

use crate::db::{
    CheckoutItemRepository, PaymentUserRepository, PurchaseIdentity, PurchaseRepository,
    RepositoryError,
};
use crate::error::{AppError, Result};
use crate::middleware::{RequireLogin, RequireManager};
use crate::models::{CheckoutItem, CheckoutItemUpdate};
use crate::services::portal_cache::{
    CachedAnswer, NO_IDENTITY_TTL, NO_PRODUCT_TTL, PortalCache, SUCCESS_TTL,
};
use crate::services::subscriptions;
use crate::state::AppState;

const CHECK_PATH: &str = "/api/portal/check";

/// Local purchases stay usable this long after being cancelled.
const LOCAL_CANCEL_GRACE: chrono::Duration = chrono::Duration::days(30);

// =============================================================================
// Portal page
// =============================================================================

/// An item as shown on a portal page.
#[derive(Clone)]
pub struct ItemView {
    pub id: String,
    pub name: String,
    pub description_html: String,
    pub price: String,
    pub currency_symbol: String,
    pub subscription: bool,
    pub paypal_plan_id: Option<String>,
}

impl ItemView {
    fn new(item: &CheckoutItem, price: &Price) -> Self {
        Self {
            id: item.id.to_string(),
            name: item.product_name.clone(),
            description_html: item.description_html(),
            price: price.display(),
            currency_symbol: price.currency_symbol(),
            subscription: item.subscription,
            paypal_plan_id: item.paypal_plan_id.clone(),
        }
    }
}

/// Portal page template.
#[derive(Template, WebTemplate)]
#[template(path = "portal/index.html")]
pub struct PortalTemplate {
    pub group: String,
    pub user_id: String,
    pub discord_user_id: String,
    pub guild_items: Vec<ItemView>,
    pub user_items: Vec<ItemView>,
}

fn display_price(price: crate::stripe::Price) -> Price {
    let recurring = price.is_recurring();
    Price::new(price.unit_amount.unwrap_or_default(), price.currency, recurring)
}

/// Look up an item's price on its seller's Stripe account.
///
/// Stripe being unreachable shouldn't take the page down, so failures show
/// an unknown price instead.
async fn fetch_price(state: &AppState, item: &CheckoutItem, account: Option<&str>) -> Price {
    match state.stripe().get_price(&item.stripe_price_id, account).await {
        Ok(price) => display_price(price),
        Err(e) => {
            warn!(item = %item.product_name, error = %e, "Failed to fetch price");
            Price::unknown()
        }
    }
}

/// Display the items of a product group.
///
/// # Errors
///
/// Returns error if the database query fails.
#[instrument(skip(state, user))]
pub async fn index(
    State(state): State<AppState>,
    RequireLogin(user): RequireLogin,
    Path(group): Path<String>,
) -> Result<Response> {
    let items = CheckoutItemRepository::new(state.pool())
        .list_by_group(&group)
        .await?;
    if items.is_empty() {
        return Ok(Redirect::to("/").into_response());
    }

    let creators = PaymentUserRepository::new(state.pool());
    let mut accounts: HashMap<PaymentUserId, Option<String>> = HashMap::new();
    let mut guild_items = Vec::new();
    let mut user_items = Vec::new();
    for item in &items {
        if !accounts.contains_key(&item.creator_id) {
            let account = creators
                .get_by_id(item.creator_id)
                .await?
                .and_then(|c| c.stripe_account().map(str::to_owned));
            accounts.insert(item.creator_id, account);
        }
        let account = accounts.get(&item.creator_id).cloned().flatten();
        let view = ItemView::new(item, &fetch_price(&state, item, account.as_deref()).await);
        if item.per_guild {
            guild_items.push(view);
        } else {
            user_items.push(view);
        }
    }

    Ok(PortalTemplate {
        group,
        user_id: user.id.to_string(),
        discord_user_id: user.discord_user_id.unwrap_or_default(),
        guild_items,
        user_items,
    }
    .into_response())
}

// =============================================================================
// Purchase check
// =============================================================================

/// Which product a check is about.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProductSelector {
    Id(String),
    Name(String),
}

/// Query parameters of a purchase check, first value per key.
#[derive(Debug, Default)]
struct CheckParams<'a> {
    values: HashMap<&'a str, &'a str>,
}

impl<'a> CheckParams<'a> {
    fn from_pairs(pairs: &'a [(String, String)]) -> Self {
        let mut values = HashMap::new();
        for (key, value) in pairs {
            if !value.is_empty() {
                values.entry(key.as_str()).or_insert(value.as_str());
            }
        }
        Self { values }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.values.get(key).copied()
    }

    fn product(&self) -> Option<ProductSelector> {
        self.get("product_id")
            .map(|id| ProductSelector::Id(id.to_owned()))
            .or_else(|| self.get("product_name").map(|n| ProductSelector::Name(n.to_owned())))
    }

    /// The identity to check, in priority order.
    ///
    /// `Ok(None)` means no identity was given at all.
    fn identity(&self) -> std::result::Result<Option<PurchaseIdentity>, &'static str> {
        if let Some(id) = self.get("id") {
            return id
                .parse()
                .map(|id| Some(PurchaseIdentity::LoginId(id)))
                .map_err(|_| "Invalid user ID.");
        }
        if let Some(id) = self.get("discord_user_id").or_else(|| self.get("user_id")) {
            return Ok(Some(PurchaseIdentity::Discord(id.to_owned())));
        }
        if let Some(id) = self.get("guild_id") {
            return id
                .parse()
                .map(|id| Some(PurchaseIdentity::Guild(id)))
                .map_err(|_| "Invalid guild ID.");
        }
        if let Some(id) = self.get("google_user_id") {
            return Ok(Some(PurchaseIdentity::Google(id.to_owned())));
        }
        Ok(self
            .get("facebook_user_id")
            .map(|id| PurchaseIdentity::Facebook(id.to_owned())))
    }
}

/// A check answer and how long it may be cached for.
#[derive(Debug)]
struct CheckAnswer {
    status: StatusCode,
    body: Value,
    ttl: Option<Duration>,
}

fn generated() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl CheckAnswer {
    fn failure(message: &str, ttl: Option<Duration>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({
                "error": message,
                "success": false,
                "result": false,
                "generated": generated(),
            }),
            ttl,
        }
    }
}

/// Find the product a check names, together with its variants.
async fn find_product(
    state: &AppState,
    selector: &ProductSelector,
) -> std::result::Result<Option<(CheckoutItem, Vec<CheckoutItem>)>, RepositoryError> {
    let items = CheckoutItemRepository::new(state.pool());
    let base = match selector {
        ProductSelector::Id(raw) => {
            let Ok(id) = raw.parse::<CheckoutItemId>() else {
                return Ok(None);
            };
            items.get_by_id(id).await?
        }
        ProductSelector::Name(name) => items.get_by_name(name).await?,
    };
    let Some(base) = base else {
        return Ok(None);
    };
    let family = items.list_family(base.id).await?;
    Ok(Some((base, family)))
}

async fn answer_check(state: &AppState, params: &CheckParams<'_>) -> Result<CheckAnswer> {
    let Some(selector) = params.product() else {
        return Ok(CheckAnswer::failure("No product ID provided.", Some(NO_PRODUCT_TTL)));
    };
    let identity = match params.identity() {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            return Ok(CheckAnswer::failure(
                "No user or guild ID provided.",
                Some(NO_IDENTITY_TTL),
            ));
        }
        Err(message) => return Ok(CheckAnswer::failure(message, None)),
    };

    let Some((base, family)) = find_product(state, &selector).await? else {
        return Ok(CheckAnswer::failure("Product doesn't exist.", None));
    };

    let purchases = PurchaseRepository::new(state.pool())
        .list_active_for_identity(&identity, base.id)
        .await?;

    let body = if purchases.is_empty() {
        json!({
            "success": true,
            "result": false,
            "generated": generated(),
        })
    } else {
        let products: serde_json::Map<String, Value> = family
            .iter()
            .map(|item| Ok((item.id.to_string(), serde_json::to_value(item)?)))
            .collect::<std::result::Result<_, serde_json::Error>>()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        json!({
            "success": true,
            "result": true,
            "product": base,
            "products": products,
            "purchases": purchases,
            "generated": generated(),
        })
    };

    Ok(CheckAnswer {
        status: StatusCode::OK,
        body,
        ttl: Some(SUCCESS_TTL),
    })
}

fn bypasses_cache(headers: &HeaderMap) -> bool {
    headers
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("no-cache"))
}

/// Check whether an identity has an active purchase of a product.
///
/// # Errors
///
/// Returns error if the database query fails.
#[instrument(skip(state, headers))]
pub async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response> {
    let pairs: Vec<(String, String)> =
        url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
    let key = PortalCache::key(
        CHECK_PATH,
        pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    );

    if !bypasses_cache(&headers)
        && let Some(cached) = state.portal_cache().get(&key).await
    {
        return Ok((cached.status, Json(cached.body)).into_response());
    }

    let answer = answer_check(&state, &CheckParams::from_pairs(&pairs)).await?;
    if let Some(ttl) = answer.ttl {
        state
            .portal_cache()
            .insert(
                key,
                CachedAnswer {
                    status: answer.status,
                    body: answer.body.clone(),
                    ttl,
                },
            )
            .await;
    }
    Ok((answer.status, Json(answer.body)).into_response())
}

// =============================================================================
// Unsubscribe
// =============================================================================

#[derive(Debug, Deserialize)]
struct UnsubscribeRequest {
    id: PurchaseId,
}

fn unsubscribe_failure(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message, "success": false })),
    )
        .into_response()
}

/// Cancel one of the logged-in user's subscriptions.
///
/// Processor-managed subscriptions are cancelled with the processor and
/// expire when its webhook arrives. Local ones get a grace period here.
///
/// # Errors
///
/// Returns error if the database query fails.
#[instrument(skip_all)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    RequireLogin(user): RequireLogin,
    body: Bytes,
) -> Result<Response> {
    let Ok(request) = serde_json::from_slice::<UnsubscribeRequest>(&body) else {
        return Ok(unsubscribe_failure("Invalid data."));
    };

    let purchases = PurchaseRepository::new(state.pool());
    let Some(purchase) = purchases.get_active_subscription(request.id, user.id).await? else {
        return Ok(unsubscribe_failure("No active subscription found."));
    };
    let Some(cancel_url) = purchase.cancel_url.as_deref() else {
        return Ok(unsubscribe_failure("No active subscription found."));
    };
    let item = CheckoutItemRepository::new(state.pool())
        .get_by_id(purchase.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("checkout item".to_string()))?;

    match subscriptions::cancel(&state, &item, cancel_url).await {
        Ok(Some(status)) if status.is_success() => {
            info!(purchase_id = %purchase.id, "Subscription cancelled with processor");
        }
        Ok(Some(status)) => {
            warn!(purchase_id = %purchase.id, status = %status, "Processor refused cancel");
            return Ok(unsubscribe_failure("Failed to cancel subscription."));
        }
        Ok(None) => {
            purchases
                .set_expiry(purchase.id, Some(Utc::now() + LOCAL_CANCEL_GRACE))
                .await?;
            state.portal_cache().invalidate_all().await;
            info!(purchase_id = %purchase.id, "Local subscription set to expire");
        }
        Err(e) => {
            warn!(purchase_id = %purchase.id, error = %e, "Subscription cancel failed");
            return Ok(unsubscribe_failure("Failed to cancel subscription."));
        }
    }

    Ok(Json(json!({ "success": true })).into_response())
}

// =============================================================================
// Item update
// =============================================================================

/// A manager's item edit: the item ID plus the fields to change.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub id: CheckoutItemId,
    #[serde(flatten)]
    pub update: CheckoutItemUpdate,
}

/// Edit one of the logged-in manager's checkout items.
///
/// # Errors
///
/// Returns 404 if the item doesn't exist or belongs to someone else, 400 if
/// the new name is taken.
#[instrument(skip_all)]
pub async fn update(
    State(state): State<AppState>,
    manager: RequireManager,
    Json(request): Json<UpdateRequest>,
) -> Result<StatusCode> {
    CheckoutItemRepository::new(state.pool())
        .update_for_creator(request.id, manager.payment_user.id, &request.update)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("checkout item".to_string()),
            RepositoryError::Conflict(message) => AppError::BadRequest(message),
            other => AppError::Database(other),
        })?;

    state.portal_cache().invalidate_all().await;
    info!(item_id = %request.id, "Checkout item updated");
    Ok(StatusCode::OK)
}

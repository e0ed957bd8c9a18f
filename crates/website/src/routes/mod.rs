//! HTTP route handlers for the website.
//!
//! # Route Structure
//!
//! ```text
//! GET   /                       - Home page
//! GET   /logout                 - Clear the session
//!
//! # Portal
//! GET   /portal/{group}         - Items of a product group (login required)
//! GET   /api/portal/check       - Has an identity bought a product (cached)
//! POST  /api/portal/unsubscribe - Cancel one of the user's subscriptions
//! PATCH /api/portal/update      - Edit one of the manager's items
//!
//! # Checkout items (managers only)
//! GET   /checkout_items         - List every item
//! POST  /checkout_items         - Create or replace an item by name
//!
//! # Webhooks
//! POST  /webhooks/stripe/create_checkout_session - Start a Stripe checkout (CORS *)
//! POST  /webhooks/stripe/purchase_webhook        - Stripe events
//! POST  /webhooks/paypal/purchase_ipn            - PayPal IPN messages
//! POST  /webhooks/upgradechat/purchase_webhook   - Upgrade.Chat events
//! POST  /webhooks/cancel_subscription            - Backend-initiated cancel
//! ```

pub mod checkout_items;
pub mod pages;
pub mod paypal;
pub mod portal;
pub mod stripe;
pub mod subscriptions;
pub mod upgradechat;

use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Create the portal API routes router.
pub fn portal_api_routes() -> Router<AppState> {
    Router::new()
        .route("/check", get(portal::check))
        .route("/unsubscribe", post(portal::unsubscribe))
        .route("/update", patch(portal::update))
}

/// Create the webhook routes router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        // Called from the browser on other Voxel Fox sites
        .route(
            "/stripe/create_checkout_session",
            post(stripe::create_checkout_session).layer(CorsLayer::permissive()),
        )
        .route("/stripe/purchase_webhook", post(stripe::purchase_webhook))
        .route("/paypal/purchase_ipn", post(paypal::purchase_ipn))
        .route(
            "/upgradechat/purchase_webhook",
            post(upgradechat::purchase_webhook),
        )
        .route(
            "/cancel_subscription",
            post(subscriptions::cancel_subscription),
        )
}

/// Create all website routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::index))
        .route("/logout", get(pages::logout))
        .route("/portal/{group}", get(portal::index))
        .route(
            "/checkout_items",
            get(checkout_items::index).post(checkout_items::create),
        )
        .nest("/api/portal", portal_api_routes())
        .nest("/webhooks", webhook_routes())
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;
    use sqlx::postgres::PgPoolOptions;

    use crate::config::test_config;
    use crate::state::AppState;

    /// State whose pool never connects; only for paths that don't query.
    pub(crate) fn test_state() -> AppState {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/voxelfox_test")
            .unwrap_or_else(|e| panic!("lazy pool: {e}"));
        AppState::new(config, pool).unwrap_or_else(|e| panic!("state: {e}"))
    }

    pub(crate) fn test_router() -> Router {
        super::routes().with_state(test_state())
    }

    pub(crate) async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        serde_json::from_slice(&body).unwrap_or_default()
    }
}

//! Site pages that aren't part of the portal.

use askama::Template;
use askama_web::WebTemplate;
use axum::response::{IntoResponse, Redirect};
use tower_sessions::Session;
use tracing::{instrument, warn};

use crate::error::clear_sentry_user;
use crate::middleware::{OptionalLogin, clear_current_user};

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub logged_in: bool,
}

/// Display the home page.
#[instrument(skip_all)]
pub async fn index(OptionalLogin(user): OptionalLogin) -> impl IntoResponse {
    IndexTemplate {
        logged_in: user.is_some(),
    }
}

/// Log out and go home.
#[instrument(skip_all)]
pub async fn logout(session: Session) -> impl IntoResponse {
    if let Err(e) = clear_current_user(&session).await {
        warn!(error = %e, "Failed to clear session on logout");
    }
    clear_sentry_user();
    Redirect::to("/")
}

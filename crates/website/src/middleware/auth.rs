//! Login extractors.
//!
//! Logging in happens through Discord elsewhere; these extractors only read
//! who is logged in from the session and decide what to do when nobody is.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{Method, StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::warn;

use crate::db::PaymentUserRepository;
use crate::models::{CurrentUser, PaymentUser, session_keys};
use crate::state::AppState;

/// Where users without a session are sent.
pub const LOGIN_PATH: &str = "/login";

/// Extractor that requires a logged-in user.
///
/// Page requests are redirected to the login page, remembering where they
/// were going; `/api/` requests get a 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn portal(RequireLogin(user): RequireLogin) -> impl IntoResponse {
///     format!("Hello, {}!", user.id)
/// }
/// ```
pub struct RequireLogin(pub CurrentUser);

/// Error returned when a login is required but missing.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to(LOGIN_PATH).into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

fn is_api(parts: &Parts) -> bool {
    parts.uri.path().starts_with("/api/")
}

impl<S> FromRequestParts<S> for RequireLogin
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::Unauthorized)?;

        if let Some(user) = session
            .get::<CurrentUser>(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten()
        {
            return Ok(Self(user));
        }

        if is_api(parts) {
            return Err(AuthRejection::Unauthorized);
        }

        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_owned(), ToString::to_string);
        if let Err(e) = session.insert(session_keys::REDIRECT_ON_LOGIN, target).await {
            warn!(error = %e, "Failed to remember login redirect");
        }
        Err(AuthRejection::RedirectToLogin)
    }
}

/// Extractor that optionally gets the current user.
pub struct OptionalLogin(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalLogin
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentUser>(session_keys::CURRENT_USER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(user))
    }
}

/// Extractor for managers: logged-in users who sell checkout items.
pub struct RequireManager {
    pub user: CurrentUser,
    pub payment_user: PaymentUser,
}

/// Error returned when a manager is required.
#[derive(Debug)]
pub enum ManagerRejection {
    Login(AuthRejection),
    /// Logged in, but not a manager; page requests go home.
    RedirectHome,
    /// Logged in, but not a manager; API calls and form posts get JSON.
    NotManager,
    /// The manager lookup itself failed.
    Unavailable,
}

impl IntoResponse for ManagerRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Login(rejection) => rejection.into_response(),
            Self::RedirectHome => Redirect::to("/").into_response(),
            Self::NotManager => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "You are not a valid user." })),
            )
                .into_response(),
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireManager
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ManagerRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let wants_json = is_api(parts) || parts.method != Method::GET;
        let RequireLogin(user) = match RequireLogin::from_request_parts(parts, state).await {
            Ok(login) => login,
            Err(_) if wants_json => return Err(ManagerRejection::NotManager),
            Err(rejection) => return Err(ManagerRejection::Login(rejection)),
        };

        let app_state = AppState::from_ref(state);
        let payment_user = PaymentUserRepository::new(app_state.pool())
            .get_by_login_id(user.id)
            .await
            .map_err(|e| {
                warn!(error = %e, "Manager lookup failed");
                ManagerRejection::Unavailable
            })?;

        match payment_user {
            Some(payment_user) => Ok(Self { user, payment_user }),
            None if wants_json => Err(ManagerRejection::NotManager),
            None => Err(ManagerRejection::RedirectHome),
        }
    }
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_responses() {
        let response = AuthRejection::RedirectToLogin.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get("location").and_then(|v| v.to_str().ok()),
            Some(LOGIN_PATH)
        );
        assert_eq!(
            AuthRejection::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ManagerRejection::NotManager.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        let home = ManagerRejection::RedirectHome.into_response();
        assert_eq!(
            home.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/")
        );
    }
}

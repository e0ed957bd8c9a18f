//! PayPal REST and IPN client.

use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use tracing::{debug, instrument, warn};

use super::error::PayPalError;
use super::ipn::ipn_verify_url;
use super::types::{AccessToken, Subscription};
use crate::config::PayPalConfig;
use crate::services::token_cache::TokenCache;

/// Refresh the access token this long before PayPal says it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// The only body PayPal sends back for a genuine IPN.
const IPN_VERIFIED: &str = "VERIFIED";

/// PayPal API client.
#[derive(Clone)]
pub struct PayPalClient {
    client: Client,
    config: PayPalConfig,
    token: TokenCache,
}

impl std::fmt::Debug for PayPalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PayPalClient {
    #[must_use]
    pub fn new(client: Client, config: PayPalConfig) -> Self {
        Self {
            client,
            config,
            token: TokenCache::new(),
        }
    }

    /// A bearer token for the REST API, fetched with client credentials
    /// when the cached one is missing or about to expire.
    ///
    /// # Errors
    ///
    /// Returns error if PayPal refuses the credentials.
    #[instrument(skip(self))]
    pub async fn access_token(&self) -> Result<String, PayPalError> {
        let now = Utc::now();
        if let Some(token) = self.token.get(now).await {
            return Ok(token);
        }

        let url = format!("{}/v1/oauth2/token", self.config.api_base());
        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PayPalError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| PayPalError::Response(e.to_string()))?;
        self.token
            .set(
                token.access_token.clone(),
                now + Duration::seconds(token.expires_in),
                Duration::seconds(TOKEN_REFRESH_MARGIN_SECS),
            )
            .await;
        debug!(expires_in = token.expires_in, "PayPal access token refreshed");
        Ok(token.access_token)
    }

    /// Echo a raw IPN body back to PayPal and check it answers `VERIFIED`.
    ///
    /// # Errors
    ///
    /// Returns error if PayPal can't be reached.
    #[instrument(skip(self, raw_body))]
    pub async fn verify_ipn(&self, raw_body: &str, sandbox: bool) -> Result<bool, PayPalError> {
        let response = self
            .client
            .post(ipn_verify_url(sandbox))
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(format!("cmd=_notify-validate&{raw_body}"))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, "PayPal IPN verification endpoint failed");
            return Ok(false);
        }
        Ok(body.trim() == IPN_VERIFIED)
    }

    /// Fetch a billing subscription.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or PayPal rejects it.
    #[instrument(skip(self))]
    pub async fn get_subscription(&self, subscription_id: &str) -> Result<Subscription, PayPalError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/v1/billing/subscriptions/{subscription_id}",
            self.config.api_base()
        );
        let response = self.client.get(&url).bearer_auth(&token).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.token.clear().await;
            }
            let message = response.text().await.unwrap_or_default();
            return Err(PayPalError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PayPalError::Response(e.to_string()))
    }

    /// The REST URL that cancels a subscription.
    #[must_use]
    pub fn subscription_cancel_url(&self, subscription_id: &str) -> String {
        format!(
            "{}/v1/billing/subscriptions/{subscription_id}/cancel",
            self.config.api_base()
        )
    }

    /// Cancel a subscription through its cancel URL.
    ///
    /// Returns PayPal's status code; PayPal answers `204` on success.
    ///
    /// # Errors
    ///
    /// Returns error if no token can be obtained or the request can't be sent.
    #[instrument(skip(self))]
    pub async fn cancel_subscription(&self, cancel_url: &str) -> Result<StatusCode, PayPalError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(cancel_url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "reason": "Cancelled by user." }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.token.clear().await;
            }
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "PayPal refused subscription cancel");
        }
        Ok(status)
    }
}

//! Upgrade.Chat API client.

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use tracing::{debug, instrument, warn};

use super::error::UpgradeChatError;
use super::types::{AccessToken, Validation};
use crate::config::UpgradeChatConfig;
use crate::services::token_cache::TokenCache;

/// Upgrade.Chat API base URL.
pub const UPGRADECHAT_API_BASE: &str = "https://api.upgrade.chat";

/// Refresh the access token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 10;

/// Upgrade.Chat API client.
#[derive(Clone)]
pub struct UpgradeChatClient {
    client: Client,
    config: UpgradeChatConfig,
    token: TokenCache,
}

impl std::fmt::Debug for UpgradeChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeChatClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl UpgradeChatClient {
    #[must_use]
    pub fn new(client: Client, config: UpgradeChatConfig) -> Self {
        Self {
            client,
            config,
            token: TokenCache::new(),
        }
    }

    /// The product name mapping this client was configured with.
    #[must_use]
    pub const fn config(&self) -> &UpgradeChatConfig {
        &self.config
    }

    /// A bearer token, fetched with client credentials when needed.
    ///
    /// # Errors
    ///
    /// Returns error if Upgrade.Chat refuses the credentials.
    #[instrument(skip(self))]
    pub async fn access_token(&self) -> Result<String, UpgradeChatError> {
        if let Some(token) = self.token.get(Utc::now()).await {
            return Ok(token);
        }

        let response = self
            .client
            .post(format!("{UPGRADECHAT_API_BASE}/oauth/token"))
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpgradeChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| UpgradeChatError::Response(e.to_string()))?;
        let expires_at = DateTime::from_timestamp_millis(token.access_token_expires_in)
            .ok_or_else(|| {
                UpgradeChatError::Response(format!(
                    "token expiry {} is out of range",
                    token.access_token_expires_in
                ))
            })?;
        self.token
            .set(
                token.access_token.clone(),
                expires_at,
                Duration::seconds(TOKEN_REFRESH_MARGIN_SECS),
            )
            .await;
        debug!(expires_at = %expires_at, "Upgrade.Chat access token refreshed");
        Ok(token.access_token)
    }

    /// Ask Upgrade.Chat whether it really sent the webhook event `event_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the validation endpoint can't be reached or answers
    /// with something other than a validation result.
    #[instrument(skip(self))]
    pub async fn validate_event(&self, event_id: &str) -> Result<bool, UpgradeChatError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!(
                "{UPGRADECHAT_API_BASE}/v1/webhook-events/{event_id}/validate"
            ))
            .bearer_auth(&token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.token.clear().await;
            }
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, "Upgrade.Chat event validation failed");
            return Err(UpgradeChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let validation: Validation = response
            .json()
            .await
            .map_err(|e| UpgradeChatError::Response(e.to_string()))?;
        Ok(validation.valid)
    }
}

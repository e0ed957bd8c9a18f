//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::WebsiteConfig;
use crate::paypal::PayPalClient;
use crate::services::notifier::Notifier;
use crate::services::portal_cache::PortalCache;
use crate::stripe::StripeClient;
use crate::upgradechat::UpgradeChatClient;

/// Timeout for every outbound HTTP request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: WebsiteConfig,
    pool: PgPool,
    stripe: StripeClient,
    paypal: PayPalClient,
    upgradechat: Option<UpgradeChatClient>,
    notifier: Notifier,
    portal_cache: PortalCache,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client can't be built.
    pub fn new(config: WebsiteConfig, pool: PgPool) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("voxelfox-website/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let stripe = StripeClient::new(http.clone(), config.stripe.api_key.clone());
        let paypal = PayPalClient::new(http.clone(), config.paypal.clone());
        let upgradechat = config
            .upgradechat
            .clone()
            .map(|uc| UpgradeChatClient::new(http.clone(), uc));
        let notifier = Notifier::new(http);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                stripe,
                paypal,
                upgradechat,
                notifier,
                portal_cache: PortalCache::new(),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &WebsiteConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn stripe(&self) -> &StripeClient {
        &self.inner.stripe
    }

    #[must_use]
    pub fn paypal(&self) -> &PayPalClient {
        &self.inner.paypal
    }

    /// The Upgrade.Chat client, when the integration is configured.
    #[must_use]
    pub fn upgradechat(&self) -> Option<&UpgradeChatClient> {
        self.inner.upgradechat.as_ref()
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    #[must_use]
    pub fn portal_cache(&self) -> &PortalCache {
        &self.inner.portal_cache
    }
}

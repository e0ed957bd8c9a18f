//! Cache for OAuth client-credentials access tokens.
//!
//! PayPal and Upgrade.Chat both hand out short-lived bearer tokens. Each
//! client keeps one `TokenCache` and only asks for a new token once the
//! cached one is about to expire.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

#[derive(Clone)]
struct CachedToken {
    token: SecretString,
    refresh_at: DateTime<Utc>,
}

/// A single cached bearer token, shared between clones of a client.
#[derive(Clone, Default)]
pub struct TokenCache {
    inner: Arc<RwLock<Option<CachedToken>>>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, unless it is due for refresh at `now`.
    pub async fn get(&self, now: DateTime<Utc>) -> Option<String> {
        let guard = self.inner.read().await;
        guard
            .as_ref()
            .filter(|cached| cached.refresh_at > now)
            .map(|cached| cached.token.expose_secret().to_owned())
    }

    /// Store a token that expires at `expires_at`, refreshing `margin` early.
    pub async fn set(&self, token: String, expires_at: DateTime<Utc>, margin: Duration) {
        let mut guard = self.inner.write().await;
        *guard = Some(CachedToken {
            token: SecretString::from(token),
            refresh_at: expires_at - margin,
        });
    }

    /// Forget the cached token, e.g. after the provider rejected it.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_cache() {
        let cache = TokenCache::new();
        assert_eq!(cache.get(Utc::now()).await, None);
    }

    #[tokio::test]
    async fn test_token_served_until_margin() {
        let cache = TokenCache::new();
        let now = Utc::now();
        cache
            .set("abc".to_string(), now + Duration::seconds(3600), Duration::seconds(60))
            .await;

        assert_eq!(cache.get(now).await.as_deref(), Some("abc"));
        assert_eq!(cache.get(now + Duration::seconds(3539)).await.as_deref(), Some("abc"));
        assert_eq!(cache.get(now + Duration::seconds(3540)).await, None);
    }

    #[tokio::test]
    async fn test_clones_share_token() {
        let cache = TokenCache::new();
        let clone = cache.clone();
        let now = Utc::now();
        cache
            .set("shared".to_string(), now + Duration::hours(1), Duration::zero())
            .await;
        assert_eq!(clone.get(now).await.as_deref(), Some("shared"));

        clone.clear().await;
        assert_eq!(cache.get(now).await, None);
    }
}

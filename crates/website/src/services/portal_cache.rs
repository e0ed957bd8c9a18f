//! Response cache for the purchase check API.
//!
//! Bots poll `/api/portal/check` for every command they run, so answers are
//! kept in memory with a lifetime chosen per answer.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use moka::Expiry;
use moka::future::Cache;

/// Successful checks.
pub const SUCCESS_TTL: Duration = Duration::from_secs(60);
/// Checks that named no product; these only come from misconfigured callers.
pub const NO_PRODUCT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Checks that named no user or guild.
pub const NO_IDENTITY_TTL: Duration = Duration::from_secs(60);

/// A cached check answer.
#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub status: StatusCode,
    pub body: serde_json::Value,
    pub ttl: Duration,
}

struct PerAnswerTtl;

impl Expiry<String, CachedAnswer> for PerAnswerTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedAnswer,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Check answers keyed by path and sorted query string.
#[derive(Clone)]
pub struct PortalCache {
    cache: Cache<String, CachedAnswer>,
}

impl std::fmt::Debug for PortalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl Default for PortalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PortalCache {
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .expire_after(PerAnswerTtl)
            .build();
        Self { cache }
    }

    /// Build the key for a request. Query order doesn't matter.
    #[must_use]
    pub fn key<'a>(path: &str, query: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
        let mut pairs: Vec<_> = query.into_iter().collect();
        pairs.sort_unstable();
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{path}?{query}")
    }

    pub async fn get(&self, key: &str) -> Option<CachedAnswer> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: String, answer: CachedAnswer) {
        self.cache.insert(key, answer).await;
    }

    /// Drop every cached answer.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_query_order() {
        let a = PortalCache::key("/api/portal/check", [("product_name", "Gold"), ("discord_user_id", "1")]);
        let b = PortalCache::key("/api/portal/check", [("discord_user_id", "1"), ("product_name", "Gold")]);
        assert_eq!(a, b);
        assert_eq!(a, "/api/portal/check?discord_user_id=1&product_name=Gold");
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = PortalCache::new();
        let key = PortalCache::key("/api/portal/check", [("guild_id", "5")]);
        cache
            .insert(
                key.clone(),
                CachedAnswer {
                    status: StatusCode::OK,
                    body: serde_json::json!({"success": true, "result": false}),
                    ttl: SUCCESS_TTL,
                },
            )
            .await;
        let answer = cache.get(&key).await;
        assert_eq!(answer.map(|a| a.body["success"].clone()), Some(serde_json::json!(true)));

        cache.invalidate_all().await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire_per_answer() {
        let cache = PortalCache::new();
        cache
            .insert(
                "short".to_string(),
                CachedAnswer {
                    status: StatusCode::BAD_REQUEST,
                    body: serde_json::json!({}),
                    ttl: Duration::from_millis(10),
                },
            )
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get("short").await.is_none());
    }
}

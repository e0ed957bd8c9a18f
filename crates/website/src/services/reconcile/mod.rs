//! Turning payment processor events into purchases.
//!
//! Each processor has its own module with a single entry point that the
//! webhook route calls once the delivery is authenticated. The helpers here
//! are shared: metadata merging, working out who bought something, and
//! finding a purchase that is already stored.
//!
//! Checkout metadata is the only link between a payment and our users. We
//! put it on Stripe checkout sessions and PayPal `custom` fields when the
//! checkout is created, and read these keys back:
//!
//! - `user_id` - login user ID
//! - `discord_user_id` - buyer's Discord account
//! - `discord_guild_id` - set when the purchase is for a whole guild

pub mod paypal;
pub mod stripe;
pub mod upgradechat;

use sqlx::PgPool;
use tracing::warn;

use voxelfox_core::LoginUserId;

use crate::db::{LoginUserRepository, PurchaseRepository, RepositoryError};
use crate::models::{CheckoutItem, LoginUser, Purchase, PurchaseOwner};
use crate::stripe::Metadata;

/// Merge metadata layers; keys in later layers win.
#[must_use]
pub fn merge_metadata<'a>(layers: impl IntoIterator<Item = &'a Metadata>) -> Metadata {
    let mut merged = Metadata::new();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// A metadata value as text. Numbers are accepted since Discord IDs arrive
/// both ways.
#[must_use]
pub fn metadata_str(metadata: &Metadata, key: &str) -> Option<String> {
    match metadata.get(key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The Discord guild a purchase is for, if any.
#[must_use]
pub fn guild_id(metadata: &Metadata) -> Option<i64> {
    metadata_str(metadata, "discord_guild_id")
        .and_then(|id| id.parse().ok())
        .filter(|id| *id != 0)
}

/// Who owns a purchase made by `user_id`.
#[must_use]
pub fn owner_for(user_id: LoginUserId, metadata: &Metadata) -> PurchaseOwner {
    guild_id(metadata).map_or(PurchaseOwner::User(user_id), PurchaseOwner::Guild)
}

/// Find the login user a checkout's metadata points at.
///
/// `user_id` is tried first. Otherwise the buyer is found, or created, by
/// Discord ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn resolve_login_user(
    pool: &PgPool,
    metadata: &Metadata,
) -> Result<Option<LoginUser>, RepositoryError> {
    let users = LoginUserRepository::new(pool);

    if let Some(raw) = metadata_str(metadata, "user_id") {
        match raw.parse::<LoginUserId>() {
            Ok(id) => {
                if let Some(user) = users.get_by_id(id).await? {
                    return Ok(Some(user));
                }
                warn!(user_id = %id, "Checkout metadata names an unknown user");
            }
            Err(_) => warn!(user_id = %raw, "Checkout metadata has a malformed user ID"),
        }
    }

    match metadata_str(metadata, "discord_user_id") {
        Some(discord_user_id) => users
            .get_or_create_by_discord_id(&discord_user_id)
            .await
            .map(Some),
        None => Ok(None),
    }
}

/// Find a purchase that is already stored for this payment.
///
/// The item's purchase under the processor identifier is checked first.
/// Then, unless the item can be bought more than once, the owner's latest
/// purchase of the item counts.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn find_existing(
    pool: &PgPool,
    identifier: Option<&str>,
    owner: Option<PurchaseOwner>,
    item: &CheckoutItem,
) -> Result<Option<Purchase>, RepositoryError> {
    let purchases = PurchaseRepository::new(pool);

    if let Some(identifier) = identifier
        && let Some(purchase) = purchases.get_by_identifier(identifier, item.id).await?
    {
        return Ok(Some(purchase));
    }

    match owner {
        Some(owner) if !item.multiple => Ok(purchases
            .list_for_owner(owner, item.id)
            .await?
            .into_iter()
            .next()),
        _ => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    use crate::db::test_support::{buyer, item, new_purchase, seller};

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_merge_metadata_later_wins() {
        let customer = metadata(json!({"user_id": "old", "discord_user_id": "1"}));
        let session = metadata(json!({"user_id": "new"}));
        let merged = merge_metadata([&customer, &session]);
        assert_eq!(merged["user_id"], "new");
        assert_eq!(merged["discord_user_id"], "1");
    }

    #[test]
    fn test_metadata_str() {
        let m = metadata(json!({"a": " x ", "b": 12, "c": "", "d": null, "e": true}));
        assert_eq!(metadata_str(&m, "a").as_deref(), Some("x"));
        assert_eq!(metadata_str(&m, "b").as_deref(), Some("12"));
        assert_eq!(metadata_str(&m, "c"), None);
        assert_eq!(metadata_str(&m, "d"), None);
        assert_eq!(metadata_str(&m, "e"), None);
        assert_eq!(metadata_str(&m, "missing"), None);
    }

    #[test]
    fn test_guild_id() {
        assert_eq!(
            guild_id(&metadata(json!({"discord_guild_id": "208895639164026880"}))),
            Some(208_895_639_164_026_880)
        );
        assert_eq!(guild_id(&metadata(json!({"discord_guild_id": 42}))), Some(42));
        assert_eq!(guild_id(&metadata(json!({"discord_guild_id": "0"}))), None);
        assert_eq!(guild_id(&metadata(json!({"discord_guild_id": "abc"}))), None);
        assert_eq!(guild_id(&metadata(json!({}))), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_find_existing_prefers_identifier(pool: PgPool) {
        let creator = seller(&pool, None).await;
        let gold = item(&pool, creator, "MarriageBot Gold").await;
        let user = buyer(&pool, "1234").await;
        let purchases = PurchaseRepository::new(&pool);
        let mut first = new_purchase(user, gold.id, "pi_old");
        first.timestamp = Some(chrono::Utc::now() - chrono::Duration::days(30));
        let older = purchases.upsert(&first).await.unwrap();
        let newer = purchases.upsert(&new_purchase(user, gold.id, "pi_new")).await.unwrap();
        let owner = Some(PurchaseOwner::User(user));

        let found = find_existing(&pool, Some("pi_old"), owner, &gold).await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(older.id));

        // Unknown identifier: the owner's latest purchase of the item
        let found = find_existing(&pool, Some("pi_missing"), owner, &gold).await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(newer.id));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_find_existing_identifier_is_per_item(pool: PgPool) {
        let creator = seller(&pool, None).await;
        let gold = item(&pool, creator, "MarriageBot Gold").await;
        let silver = item(&pool, creator, "MarriageBot Silver").await;
        let user = buyer(&pool, "1234").await;
        PurchaseRepository::new(&pool)
            .upsert(&new_purchase(user, gold.id, "TXN1"))
            .await
            .unwrap();

        let owner = Some(PurchaseOwner::User(user));
        assert!(find_existing(&pool, Some("TXN1"), owner, &silver).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_find_existing_skips_owner_for_multiple_items(pool: PgPool) {
        let creator = seller(&pool, None).await;
        let mut gold = item(&pool, creator, "MarriageBot Gold").await;
        let user = buyer(&pool, "1234").await;
        PurchaseRepository::new(&pool)
            .upsert(&new_purchase(user, gold.id, "pi_1"))
            .await
            .unwrap();
        gold.multiple = true;

        let owner = Some(PurchaseOwner::User(user));
        assert!(find_existing(&pool, Some("pi_2"), owner, &gold).await.unwrap().is_none());
        assert!(find_existing(&pool, None, None, &gold).await.unwrap().is_none());
    }

    #[test]
    fn test_owner_for() {
        let user = LoginUserId::new(Uuid::from_u128(7));
        assert_eq!(owner_for(user, &metadata(json!({}))), PurchaseOwner::User(user));
        assert_eq!(
            owner_for(user, &metadata(json!({"discord_guild_id": "5"}))),
            PurchaseOwner::Guild(5)
        );
    }
}

//! People who can buy things.

use chrono::{DateTime, Utc};
use serde::Serialize;

use voxelfox_core::LoginUserId;

/// A login identity. Each linked provider account is optional.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LoginUser {
    pub id: LoginUserId,
    pub discord_user_id: Option<String>,
    pub google_user_id: Option<String>,
    pub facebook_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

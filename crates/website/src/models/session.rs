//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use voxelfox_core::LoginUserId;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Login user's database ID.
    pub id: LoginUserId,
    /// Linked Discord account, if any.
    pub discord_user_id: Option<String>,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Where to send the user once they have logged in.
    pub const REDIRECT_ON_LOGIN: &str = "redirect_on_login";
}

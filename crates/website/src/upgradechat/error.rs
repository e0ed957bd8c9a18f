//! Upgrade.Chat-related errors.

use thiserror::Error;

/// Errors that can occur when interacting with Upgrade.Chat.
#[derive(Debug, Error)]
pub enum UpgradeChatError {
    /// HTTP request failed.
    #[error("Upgrade.Chat request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Upgrade.Chat returned a non-success status.
    #[error("Upgrade.Chat API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Upgrade.Chat response error: {0}")]
    Response(String),
}

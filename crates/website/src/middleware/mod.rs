//! Middleware and extractors.

pub mod auth;
pub mod session;

pub use auth::{OptionalLogin, RequireLogin, RequireManager, clear_current_user};
pub use session::create_session_layer;

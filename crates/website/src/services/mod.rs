//! Business logic shared by the route handlers.

pub mod notifier;
pub mod portal_cache;
pub mod reconcile;
pub mod subscriptions;
pub mod token_cache;

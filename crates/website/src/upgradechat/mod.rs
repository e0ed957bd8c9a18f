//! Upgrade.Chat integration.
//!
//! Upgrade.Chat sells Discord role subscriptions. It posts order events to
//! us; each one is checked against its validation endpoint before we act
//! on it, and its product name is mapped onto one of our checkout items.

mod client;
mod error;
mod product_map;
mod types;

pub use client::{UPGRADECHAT_API_BASE, UpgradeChatClient};
pub use error::UpgradeChatError;
pub use product_map::{DEFAULT_PRODUCT_MAP, ProductMap};
pub use types::{EventType, Order, OrderItem, Product, User, WebhookEvent};

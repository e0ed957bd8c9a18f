//! Domain models for the website database.
//!
//! Row types derive `sqlx::FromRow` and are shared between the repositories
//! in [`crate::db`] and the route handlers.

pub mod checkout_item;
pub mod login_user;
pub mod payment_user;
pub mod purchase;
pub mod session;
pub mod transaction;

pub use checkout_item::{CheckoutItem, CheckoutItemUpdate, NewCheckoutItem};
pub use login_user::LoginUser;
pub use payment_user::PaymentUser;
pub use purchase::{NewPurchase, Purchase, PurchaseOwner};
pub use session::{CurrentUser, keys as session_keys};
pub use transaction::NewTransaction;

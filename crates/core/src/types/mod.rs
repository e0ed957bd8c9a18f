//! Core types for the Voxel Fox website.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod logins;
pub mod price;
pub mod processor;

pub use id::*;
pub use logins::RequiredLogins;
pub use price::Price;
pub use processor::PaymentProcessor;

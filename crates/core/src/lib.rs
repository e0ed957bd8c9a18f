//! Voxel Fox Core - Shared types library.
//!
//! This crate provides common types used across the website components:
//! - `website` - Public site, customer portal, and payment webhooks
//! - `cli` - Command-line tools for migrations and checkout item management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, login flags, and processors

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

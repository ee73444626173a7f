//! Campus Eats Core - Shared domain types.
//!
//! Used by every other crate in the workspace:
//! - `shop` - Order lifecycle, cart, payments and persistence
//! - `storefront` - Customer-facing API and the M-Pesa callback
//! - `admin` - Staff order management
//! - `cli` - Migrations and operator tasks
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. The `postgres` feature adds `sqlx` encoding for the types that
//! are stored directly.
//!
//! # Modules
//!
//! - [`types`] - Ids, emails, phone numbers, order numbers, money helpers and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

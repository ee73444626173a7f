//! Storefront-only models.

pub mod session;

pub use session::{CurrentCustomer, keys as session_keys};

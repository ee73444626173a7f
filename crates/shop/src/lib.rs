//! Campus Eats Shop - ordering, payments and persistence.
//!
//! Shared by the storefront, admin and CLI binaries. Nothing here knows about
//! HTTP requests or sessions; handlers translate into these calls.
//!
//! # Modules
//!
//! - [`services`] - Cart, order lifecycle and catalog operations
//! - [`mpesa`] - Safaricom Daraja client (STK push, status query, callbacks)
//! - [`db`] - `PostgreSQL` and in-memory stores
//! - [`notify`] - Order event notifications (log or email)
//! - [`auth`] - Customer and staff password accounts
//! - [`config`] - Environment configuration shared by the binaries

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod mpesa;
pub mod notify;
pub mod services;

pub use error::OrderError;

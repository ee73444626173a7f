//! HTTP middleware for admin.
//!
//! Staff sessions live in the same `PostgreSQL` table as customer sessions
//! but under their own cookie, so logging into one never logs into the other.

pub mod auth;
pub mod session;

pub use auth::{RequireStaff, clear_current_staff, set_current_staff};
pub use session::create_session_layer;

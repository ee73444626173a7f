//! Customer accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use campus_eats_core::{CustomerId, Email};

/// A registered customer. Staff accounts are customers with `is_staff` set.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: CustomerId,
    pub email: Email,
    pub name: String,
    pub phone_number: Option<String>,
    pub default_hostel: Option<String>,
    pub default_room: Option<String>,
    pub is_staff: bool,
    pub loyalty_points: i64,
    pub created_at: DateTime<Utc>,
}

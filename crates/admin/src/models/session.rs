//! Session-related types for staff authentication.

use serde::{Deserialize, Serialize};

use campus_eats_core::{CustomerId, Email};
use campus_eats_shop::models::Customer;

/// Session-stored staff identity.
///
/// Only accounts with the staff flag get one; see `AuthService::login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStaff {
    pub id: CustomerId,
    pub email: Email,
    pub name: String,
}

impl From<&Customer> for CurrentStaff {
    fn from(account: &Customer) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            name: account.name.clone(),
        }
    }
}

/// Session keys for staff authentication data.
pub mod keys {
    /// Key for storing the current logged-in staff member.
    pub const CURRENT_STAFF: &str = "current_staff";
}

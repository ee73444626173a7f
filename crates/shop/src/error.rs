//! Errors returned by the cart and order services.

use thiserror::Error;

use campus_eats_core::{Category, FulfillmentStatus};

use crate::db::RepositoryError;

/// Errors from cart and order operations.
///
/// The HTTP layers map these onto status codes; everything but
/// `Repository` carries a message safe to show customers.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    #[error("your cart is empty")]
    EmptyCart,

    /// A cart holds either food or liquor, never both.
    #[error("your cart has {existing} items; {attempted} items must be ordered separately")]
    CategoryMismatch {
        existing: Category,
        attempted: Category,
    },

    /// The order's current status does not allow the operation.
    #[error("{message}")]
    InvalidState {
        status: FulfillmentStatus,
        message: String,
    },

    /// The payment provider did not send the payment prompt.
    #[error("could not start M-Pesa payment: {reason}")]
    PaymentInitiationFailed { reason: String },

    #[error("{0} not found")]
    NotFound(String),

    /// Lost a race with a concurrent update.
    #[error("{0}")]
    Conflict(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl OrderError {
    pub(crate) fn invalid_state(status: FulfillmentStatus, message: impl Into<String>) -> Self {
        Self::InvalidState {
            status,
            message: message.into(),
        }
    }
}

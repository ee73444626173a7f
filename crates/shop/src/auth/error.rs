//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] campus_eats_core::EmailError),

    /// Invalid phone number.
    #[error("invalid phone number: {0}")]
    InvalidPhone(#[from] campus_eats_core::PhoneNumberError),

    /// Wrong password, unknown email, or a non-staff account on the staff login.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Email already registered.
    #[error("an account with this email already exists")]
    UserAlreadyExists,

    /// Password too weak or name missing.
    #[error("{0}")]
    Validation(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

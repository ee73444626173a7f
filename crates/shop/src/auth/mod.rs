//! Password authentication for customers and staff.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::PgPool;

use campus_eats_core::{Email, PhoneNumber};

use crate::db::accounts::{AccountRepository, NewAccount};
use crate::db::RepositoryError;
use crate::models::Customer;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Registration form fields.
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub phone_number: Option<&'a str>,
    pub password: &'a str,
}

/// Authentication service.
pub struct AuthService<'a> {
    accounts: AccountRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            accounts: AccountRepository::new(pool),
        }
    }

    /// Register a customer account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` / `InvalidPhone` / `Validation` for bad input.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(&self, form: &Registration<'_>) -> Result<Customer, AuthError> {
        self.create_account(form, false).await
    }

    /// Create a staff account (CLI only).
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::register`].
    pub async fn create_staff(&self, form: &Registration<'_>) -> Result<Customer, AuthError> {
        self.create_account(form, true).await
    }

    async fn create_account(
        &self,
        form: &Registration<'_>,
        is_staff: bool,
    ) -> Result<Customer, AuthError> {
        let email = Email::parse(form.email)?;
        let name = form.name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("name is required".to_owned()));
        }
        let phone = form
            .phone_number
            .filter(|p| !p.trim().is_empty())
            .map(PhoneNumber::parse)
            .transpose()?;
        validate_password(form.password)?;
        let password_hash = hash_password(form.password)?;

        self.accounts
            .create(&NewAccount {
                email: &email,
                name,
                phone_number: phone.as_ref().map(PhoneNumber::as_str),
                password_hash: &password_hash,
                is_staff,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Login with email and password.
    ///
    /// With `staff_only`, non-staff accounts are rejected as invalid
    /// credentials so the staff login does not reveal customer emails.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        staff_only: bool,
    ) -> Result<Customer, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (customer, password_hash) = self
            .accounts
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        if staff_only && !customer.is_staff {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(customer)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a stored PHC hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::Validation(_))
        ));
        assert!(validate_password("long enough").is_ok());
    }
}

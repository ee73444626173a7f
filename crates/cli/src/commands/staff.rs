//! Staff account management.
//!
//! Staff log into the admin API with these credentials. Customer accounts
//! are never promoted; staff get their own account.

use campus_eats_shop::auth::{AuthError, AuthService, Registration};

use super::{CommandError, connect};

#[derive(Debug, thiserror::Error)]
pub enum StaffError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Create a staff account and return its id.
pub async fn create(email: &str, name: &str, password: &str) -> Result<i32, StaffError> {
    let pool = connect().await?;

    tracing::info!("Creating staff account: {email}");
    let account = AuthService::new(&pool)
        .create_staff(&Registration {
            email,
            name,
            phone_number: None,
            password,
        })
        .await?;

    tracing::info!(
        "Staff account created! ID: {}, Email: {}",
        account.id,
        account.email
    );
    Ok(account.id.as_i32())
}

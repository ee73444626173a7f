//! Authentication route handlers.
//!
//! Email and password accounts. A successful register or login stores a
//! [`CurrentCustomer`] in the session.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument};

use campus_eats_core::CustomerId;
use campus_eats_shop::auth::{AuthService, Registration};
use campus_eats_shop::db::AccountRepository;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireCustomer, clear_current_customer, set_current_customer};
use crate::models::CurrentCustomer;
use crate::state::AppState;

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub password: String,
}

/// Account summary returned by `/auth/me`.
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: CustomerId,
    pub email: String,
    pub name: String,
    pub phone_number: Option<String>,
    pub default_hostel: Option<String>,
    pub default_room: Option<String>,
    pub loyalty_points: i64,
}

/// Create an account and log in.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<RegisterForm>,
) -> Result<Response> {
    let customer = AuthService::new(state.pool())
        .register(&Registration {
            email: &form.email,
            name: &form.name,
            phone_number: form.phone_number.as_deref(),
            password: &form.password,
        })
        .await?;

    let current = CurrentCustomer::from(&customer);
    set_current_customer(&session, &current).await?;
    set_sentry_user(&current.id, Some(current.email.as_str()));
    info!(customer_id = %current.id, "Customer registered");

    Ok((StatusCode::CREATED, Json(current)).into_response())
}

/// Log in with email and password.
#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<Json<CurrentCustomer>> {
    let customer = AuthService::new(state.pool())
        .login(&form.email, &form.password, false)
        .await?;

    let current = CurrentCustomer::from(&customer);
    set_current_customer(&session, &current).await?;
    set_sentry_user(&current.id, Some(current.email.as_str()));
    info!(customer_id = %current.id, "Customer logged in");

    Ok(Json(current))
}

/// Log out. Succeeds whether or not anyone was logged in.
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_customer(&session).await?;
    session.flush().await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The logged-in customer's account.
pub async fn me(
    State(state): State<AppState>,
    RequireCustomer(current): RequireCustomer,
) -> Result<Json<AccountView>> {
    let customer = AccountRepository::new(state.pool())
        .get_by_id(current.id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;

    Ok(Json(AccountView {
        id: customer.id,
        email: customer.email.as_str().to_string(),
        name: customer.name,
        phone_number: customer.phone_number,
        default_hostel: customer.default_hostel,
        default_room: customer.default_room,
        loyalty_points: customer.loyalty_points,
    }))
}

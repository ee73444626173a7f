//! Staff login.
//!
//! Staff accounts are created with `cli staff create`; there is no signup.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, instrument};

use campus_eats_shop::auth::AuthService;

use crate::error::Result;
use crate::middleware::{RequireStaff, clear_current_staff, set_current_staff};
use crate::models::CurrentStaff;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<Json<CurrentStaff>> {
    let account = AuthService::new(state.pool())
        .login(&form.email, &form.password, true)
        .await?;

    let staff = CurrentStaff::from(&account);
    set_current_staff(&session, &staff).await?;
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(staff.id.to_string()),
            email: Some(staff.email.as_str().to_string()),
            ..Default::default()
        }));
    });
    info!(staff_id = %staff.id, "Staff logged in");

    Ok(Json(staff))
}

pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_staff(&session).await?;
    session.flush().await?;
    sentry::configure_scope(|scope| scope.set_user(None));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(RequireStaff(staff): RequireStaff) -> Json<CurrentStaff> {
    Json(staff)
}

//! Payment maintenance.

use axum::{Json, extract::State};
use chrono::TimeDelta;
use serde::Deserialize;
use tracing::instrument;

use campus_eats_shop::services::StaleSweepReport;

use crate::error::{AppError, Result};
use crate::middleware::RequireStaff;
use crate::state::AppState;

/// Payments younger than this may still be on the customer's phone.
const DEFAULT_OLDER_THAN_MINUTES: i64 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileForm {
    #[serde(default)]
    pub older_than_minutes: Option<i64>,
}

/// Query the provider for every order stuck in `processing`.
#[instrument(skip(state, staff, form), fields(staff_id = %staff.id))]
pub async fn reconcile(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Json(form): Json<ReconcileForm>,
) -> Result<Json<StaleSweepReport>> {
    let minutes = form
        .older_than_minutes
        .unwrap_or(DEFAULT_OLDER_THAN_MINUTES);
    if minutes < 0 {
        return Err(AppError::BadRequest(
            "older_than_minutes cannot be negative".to_string(),
        ));
    }

    let report = state
        .orders()
        .reconcile_stale_payments(TimeDelta::minutes(minutes))
        .await?;
    Ok(Json(report))
}

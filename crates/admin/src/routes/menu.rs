//! Menu management handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use campus_eats_core::FoodItemId;
use campus_eats_shop::models::{FoodItem, NewFoodItem};

use crate::error::Result;
use crate::middleware::RequireStaff;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MenuList {
    pub items: Vec<FoodItem>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityForm {
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct PriceForm {
    pub price: Decimal,
}

/// Every item, including unavailable ones.
pub async fn index(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
) -> Result<Json<MenuList>> {
    let items = state.catalog().all_items().await?;
    Ok(Json(MenuList { items }))
}

#[instrument(skip(state, staff, item), fields(staff_id = %staff.id, name = %item.name))]
pub async fn create(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Json(item): Json<NewFoodItem>,
) -> Result<Response> {
    let created = state.catalog().create_item(&item).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

#[instrument(skip(state, staff, form), fields(staff_id = %staff.id))]
pub async fn set_availability(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<i32>,
    Json(form): Json<AvailabilityForm>,
) -> Result<Json<FoodItem>> {
    let item = state
        .catalog()
        .set_availability(FoodItemId::new(id), form.available)
        .await?;
    Ok(Json(item))
}

#[instrument(skip(state, staff, form), fields(staff_id = %staff.id))]
pub async fn set_price(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<i32>,
    Json(form): Json<PriceForm>,
) -> Result<Json<FoodItem>> {
    let item = state
        .catalog()
        .set_price(FoodItemId::new(id), form.price)
        .await?;
    Ok(Json(item))
}

//! Menu route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use campus_eats_core::{Category, FoodItemId};
use campus_eats_shop::models::FoodItem;

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MenuQuery {
    pub category: Option<Category>,
}

#[derive(Debug, Serialize)]
pub struct MenuResponse {
    pub items: Vec<FoodItem>,
}

/// Available items, featured first, then most ordered.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<MenuQuery>,
) -> Result<Json<MenuResponse>> {
    let items = state.catalog().menu(query.category).await?;
    Ok(Json(MenuResponse { items }))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<FoodItem>> {
    Ok(Json(state.catalog().item(FoodItemId::new(id)).await?))
}

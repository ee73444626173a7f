//! Order board handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use campus_eats_core::{FulfillmentStatus, OrderNumber};
use campus_eats_shop::OrderError;
use campus_eats_shop::models::{Order, OrderDetail};
use campus_eats_shop::services::CancelledBy;

use crate::error::{AppError, Result};
use crate::middleware::RequireStaff;
use crate::state::AppState;

/// Default page size for the order board.
const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
pub struct NewOrdersQuery {
    pub since: DateTime<Utc>,
}

/// New orders plus the server clock, which the board sends back as the
/// next `since` so client clock skew never drops an order.
#[derive(Debug, Serialize)]
pub struct NewOrders {
    pub orders: Vec<Order>,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelForm {
    pub reason: String,
}

fn parse_order_number(raw: &str) -> std::result::Result<OrderNumber, OrderError> {
    OrderNumber::parse(raw).map_err(|_| OrderError::NotFound("order".to_string()))
}

pub async fn index(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
    Query(query): Query<ListQuery>,
) -> Result<Json<OrderList>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<FulfillmentStatus>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let orders = state
        .orders()
        .recent_orders(status, query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(OrderList { orders }))
}

pub async fn new_since(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
    Query(query): Query<NewOrdersQuery>,
) -> Result<Json<NewOrders>> {
    let server_time = Utc::now();
    let orders = state.orders().new_orders_since(query.since).await?;
    Ok(Json(NewOrders {
        orders,
        server_time,
    }))
}

pub async fn show(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
    Path(order_number): Path<String>,
) -> Result<Json<OrderDetail>> {
    let number = parse_order_number(&order_number)?;
    Ok(Json(state.orders().order_detail(&number, None).await?))
}

#[instrument(skip(state, staff, form), fields(staff_id = %staff.id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(order_number): Path<String>,
    Json(form): Json<StatusForm>,
) -> Result<Json<Order>> {
    let number = parse_order_number(&order_number)?;
    let notes = form.notes.as_deref().filter(|n| !n.trim().is_empty());
    let order = state
        .orders()
        .update_status(&number, &form.status, notes)
        .await?;
    info!(order_number = %order.order_number, status = %order.status, "Order status updated");
    Ok(Json(order))
}

#[instrument(skip(state, staff, form), fields(staff_id = %staff.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(order_number): Path<String>,
    Json(form): Json<CancelForm>,
) -> Result<Json<Order>> {
    let number = parse_order_number(&order_number)?;
    let order = state
        .orders()
        .cancel_order(&number, &form.reason, CancelledBy::Staff)
        .await?;
    Ok(Json(order))
}

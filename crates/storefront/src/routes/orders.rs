//! Order route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use campus_eats_core::{FulfillmentStatus, OrderNumber, PaymentMethod, PaymentStatus};
use campus_eats_shop::OrderError;
use campus_eats_shop::db::AccountRepository;
use campus_eats_shop::models::{Order, OrderDetail};
use campus_eats_shop::services::{CancelledBy, CustomerOrders, PlaceOrderRequest};

use crate::error::Result;
use crate::middleware::RequireCustomer;
use crate::state::AppState;

/// Checkout response.
#[derive(Debug, Serialize)]
pub struct PlacedOrderResponse {
    pub order_number: OrderNumber,
    pub estimated_delivery: DateTime<Utc>,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
}

/// Compact status for client polling.
#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_number: OrderNumber,
    pub status: FulfillmentStatus,
    pub status_display: &'static str,
    pub payment_status: PaymentStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderStatusResponse {
    fn from(order: Order) -> Self {
        Self {
            status_display: order.status.display_name(),
            order_number: order.order_number,
            status: order.status,
            payment_status: order.payment_status,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelForm {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RateForm {
    pub rating: i16,
    #[serde(default)]
    pub review: String,
}

/// Unparseable order numbers cannot exist.
fn parse_order_number(raw: &str) -> std::result::Result<OrderNumber, OrderError> {
    OrderNumber::parse(raw).map_err(|_| OrderError::NotFound("order".to_string()))
}

/// Check out the cart.
#[instrument(skip(state, customer, request), fields(customer_id = %customer.id))]
pub async fn place(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Response> {
    let placed = state.orders().place_order(customer.id, request).await?;
    let order = &placed.order;

    // Prefill the next checkout
    if let Err(e) = AccountRepository::new(state.pool())
        .set_default_address(customer.id, &order.hostel, &order.room_number)
        .await
    {
        warn!(error = %e, "Failed to save default delivery address");
    }

    let body = PlacedOrderResponse {
        order_number: order.order_number.clone(),
        estimated_delivery: order.estimated_delivery,
        total: order.total,
        payment_method: order.payment_method,
        checkout_request_id: placed.checkout_request_id,
        customer_message: placed.customer_message,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn index(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
) -> Result<Json<CustomerOrders>> {
    Ok(Json(state.orders().customer_orders(customer.id).await?))
}

pub async fn show(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(order_number): Path<String>,
) -> Result<Json<OrderDetail>> {
    let number = parse_order_number(&order_number)?;
    let detail = state
        .orders()
        .order_detail(&number, Some(customer.id))
        .await?;
    Ok(Json(detail))
}

pub async fn status(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(order_number): Path<String>,
) -> Result<Json<OrderStatusResponse>> {
    let number = parse_order_number(&order_number)?;
    let order = state.orders().customer_order(customer.id, &number).await?;
    Ok(Json(order.into()))
}

#[instrument(skip(state, customer, form), fields(customer_id = %customer.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(order_number): Path<String>,
    Json(form): Json<CancelForm>,
) -> Result<Json<OrderStatusResponse>> {
    let number = parse_order_number(&order_number)?;
    let order = state
        .orders()
        .cancel_order(&number, &form.reason, CancelledBy::Customer(customer.id))
        .await?;
    Ok(Json(order.into()))
}

#[instrument(skip(state, customer, form), fields(customer_id = %customer.id))]
pub async fn rate(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(order_number): Path<String>,
    Json(form): Json<RateForm>,
) -> Result<Json<Order>> {
    let number = parse_order_number(&order_number)?;
    let order = state
        .orders()
        .rate_order(customer.id, &number, form.rating, &form.review)
        .await?;
    Ok(Json(order))
}

//! Cart route handlers.
//!
//! Every response carries the full cart with live prices, the delivery fee
//! for its category and the total the customer would pay at checkout.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use campus_eats_core::{CartItemId, FoodItemId};
use campus_eats_shop::services::CartSummary;

use crate::error::Result;
use crate::middleware::RequireCustomer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddItemForm {
    pub food_item_id: FoodItemId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

const fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityForm {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    #[serde(flatten)]
    pub cart: CartSummary,
    /// Fee for the cart's category; zero for an empty cart.
    pub delivery_fee: Decimal,
    pub total: Decimal,
}

impl CartResponse {
    fn new(state: &AppState, cart: CartSummary) -> Self {
        let delivery_fee = cart
            .category
            .map_or(Decimal::ZERO, |category| {
                state.orders().settings().delivery_fee(category)
            });
        Self {
            total: cart.subtotal + delivery_fee,
            delivery_fee,
            cart,
        }
    }
}

pub async fn show(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
) -> Result<Json<CartResponse>> {
    let cart = state.carts().view(customer.id).await?;
    Ok(Json(CartResponse::new(&state, cart)))
}

#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Json(form): Json<AddItemForm>,
) -> Result<Json<CartResponse>> {
    let cart = state
        .carts()
        .add_item(customer.id, form.food_item_id, form.quantity)
        .await?;
    Ok(Json(CartResponse::new(&state, cart)))
}

#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(id): Path<i32>,
    Json(form): Json<UpdateQuantityForm>,
) -> Result<Json<CartResponse>> {
    let cart = state
        .carts()
        .update_quantity(customer.id, CartItemId::new(id), form.quantity)
        .await?;
    Ok(Json(CartResponse::new(&state, cart)))
}

#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(id): Path<i32>,
) -> Result<Json<CartResponse>> {
    let cart = state
        .carts()
        .remove_item(customer.id, CartItemId::new(id))
        .await?;
    Ok(Json(CartResponse::new(&state, cart)))
}

pub async fn clear(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
) -> Result<StatusCode> {
    state.carts().clear(customer.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

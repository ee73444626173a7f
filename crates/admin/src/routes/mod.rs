//! Route definitions for the admin API.
//!
//! # Routes
//!
//! - `POST /auth/login`, `POST /auth/logout`, `GET /auth/me`
//! - `GET /api/orders?status=&limit=` - Order board
//! - `GET /api/orders/new?since=` - Orders needing the kitchen since a timestamp
//! - `GET /api/orders/{order_number}` - Detail with items and history
//! - `POST /api/orders/{order_number}/status` - Advance fulfillment
//! - `POST /api/orders/{order_number}/cancel` - Cancel on behalf of the shop
//! - `GET|POST /api/menu`, `POST /api/menu/{id}/availability`, `POST /api/menu/{id}/price`
//! - `POST /api/payments/reconcile` - Re-query stuck M-Pesa payments

pub mod auth;
pub mod menu;
pub mod orders;
pub mod payments;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Build the complete admin router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/api/orders", order_routes())
        .nest("/api/menu", menu_routes())
        .route("/api/payments/reconcile", post(payments::reconcile))
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/new", get(orders::new_since))
        .route("/{order_number}", get(orders::show))
        .route("/{order_number}/status", post(orders::update_status))
        .route("/{order_number}/cancel", post(orders::cancel))
}

fn menu_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(menu::index).post(menu::create))
        .route("/{id}/availability", post(menu::set_availability))
        .route("/{id}/price", post(menu::set_price))
}

//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                             - Liveness
//! GET  /health/ready                       - Readiness (database)
//!
//! # Auth
//! POST /auth/register                      - Create account and log in (rate limited)
//! POST /auth/login                         - Log in (rate limited)
//! POST /auth/logout                        - Log out
//! GET  /auth/me                            - Current customer and loyalty balance
//!
//! # Menu
//! GET  /api/menu?category=food|liquor      - Available items
//! GET  /api/menu/{id}                      - One item
//!
//! # Cart (requires login)
//! GET    /api/cart                         - Cart with subtotal, fee and total
//! DELETE /api/cart                         - Empty the cart
//! POST   /api/cart/items                   - Add an item
//! PATCH  /api/cart/items/{id}              - Set a line's quantity (0 removes)
//! DELETE /api/cart/items/{id}              - Remove a line
//!
//! # Orders (requires login)
//! POST /api/orders                         - Check out the cart
//! GET  /api/orders                         - Active and past orders
//! GET  /api/orders/{order_number}          - Detail with items and history
//! GET  /api/orders/{order_number}/status   - Status for polling
//! POST /api/orders/{order_number}/cancel   - Cancel a pending/preparing order
//! POST /api/orders/{order_number}/rate     - Rate a delivered order
//!
//! # Payments
//! POST /api/payments/query                 - Ask M-Pesa for a payment's status (requires login)
//! POST /mpesa/callback                     - Daraja STK result callback
//! ```

pub mod auth;
pub mod cart;
pub mod menu;
pub mod orders;
pub mod payments;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    let limited = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .layer(auth_rate_limiter());

    Router::new()
        .merge(limited)
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the menu routes router.
pub fn menu_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(menu::index))
        .route("/{id}", get(menu::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route("/items/{id}", patch(cart::update).delete(cart::remove))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::place))
        .route("/{order_number}", get(orders::show))
        .route("/{order_number}/status", get(orders::status))
        .route("/{order_number}/cancel", post(orders::cancel))
        .route("/{order_number}/rate", post(orders::rate))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/api/menu", menu_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/orders", order_routes())
        .route("/api/payments/query", post(payments::query))
        .route("/mpesa/callback", post(payments::mpesa_callback))
}

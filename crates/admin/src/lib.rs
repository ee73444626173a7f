//! Campus Eats Admin library.
//!
//! The staff API: order board, fulfillment updates, menu management and
//! payment reconciliation.
//!
//! # Security
//!
//! Every route except login requires a staff session. Staff accounts are
//! created from the CLI only.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

use axum::{Router, extract::State, http::StatusCode, routing::get};

use state::AppState;

/// Admin routes with health checks. The session layer is added by the caller.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

//! Durable store for carts, catalog and orders.
//!
//! # Backends
//!
//! - [`PgShopRepository`] - `PostgreSQL`, used by the services and CLI
//! - [`MemoryShopRepository`] - in-process, used by tests
//!
//! Both implement [`ShopRepository`]. Every method that writes more than one
//! row is a single atomic unit: either all of its rows land or none do.
//!
//! # Migrations
//!
//! Migrations live in `crates/shop/migrations/` and run via:
//! ```bash
//! cargo run -p campus-eats-cli -- migrate
//! ```

pub mod accounts;
pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use campus_eats_core::{
    CartItemId, Category, CustomerId, FoodItemId, FulfillmentStatus, OrderId, OrderNumber,
    PaymentMethod, PaymentStatus,
};

use crate::models::{
    Cart, CartLine, DeliveryInfo, FoodItem, NewFoodItem, Order, OrderItem, StatusHistoryEntry,
};

pub use accounts::AccountRepository;
pub use memory::MemoryShopRepository;
pub use postgres::PgShopRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The generated order number is already in use. Retry with a new one.
    #[error("order number {0} already exists")]
    DuplicateOrderNumber(OrderNumber),

    /// Cart lines being checked out were removed by a concurrent request.
    #[error("cart changed during checkout")]
    StaleCart,
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Apply the embedded schema migrations.
///
/// # Errors
///
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Side effects that count an order as revenue: popularity counters for each
/// of its items and loyalty points for its customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rewards {
    pub loyalty_points: i64,
}

/// Everything needed to persist a new order in one step.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub category: Category,
    pub delivery: DeliveryInfo,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub checkout_request_id: Option<String>,
    pub estimated_delivery: DateTime<Utc>,
    /// Cart lines being checked out. They become the order items and are
    /// removed from the cart; if any is already gone or its quantity has
    /// changed the create fails with [`RepositoryError::StaleCart`].
    pub lines: Vec<CartLine>,
    pub history_note: String,
    /// Applied in the same transaction when present (cash orders).
    pub rewards: Option<Rewards>,
}

/// Final payment result to record against an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSettlement {
    /// Moves the order to `next_status` if it is still `pending`, grants
    /// rewards, empties the customer's cart and appends history. A cancelled
    /// order only records the payment and history.
    Completed {
        receipt_number: Option<String>,
        paid_at: DateTime<Utc>,
        next_status: FulfillmentStatus,
        rewards: Rewards,
        note: String,
    },
    /// Cancels the order if it is still cancellable and appends history.
    Failed { reason: String, note: String },
}

impl PaymentSettlement {
    #[must_use]
    pub const fn payment_status(&self) -> PaymentStatus {
        match self {
            Self::Completed { .. } => PaymentStatus::Completed,
            Self::Failed { .. } => PaymentStatus::Failed,
        }
    }
}

/// A fulfillment transition guarded by the status it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub expected: FulfillmentStatus,
    pub new_status: FulfillmentStatus,
    pub note: String,
    pub cancellation_reason: Option<String>,
}

/// Filter for staff order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<FulfillmentStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub limit: i64,
}

/// Storage operations used by the cart and order services.
#[async_trait]
pub trait ShopRepository: Send + Sync {
    // Catalog

    async fn food_item(&self, id: FoodItemId) -> Result<Option<FoodItem>, RepositoryError>;

    /// Available items, featured first, then most ordered.
    async fn menu(&self, category: Option<Category>) -> Result<Vec<FoodItem>, RepositoryError>;

    /// Every item, available or not, by category then name. Staff listing.
    async fn catalog_items(&self) -> Result<Vec<FoodItem>, RepositoryError>;

    async fn create_food_item(&self, item: &NewFoodItem) -> Result<FoodItem, RepositoryError>;

    async fn set_item_availability(
        &self,
        id: FoodItemId,
        available: bool,
    ) -> Result<FoodItem, RepositoryError>;

    async fn set_item_price(&self, id: FoodItemId, price: Decimal)
    -> Result<FoodItem, RepositoryError>;

    // Cart

    async fn cart(&self, customer: CustomerId) -> Result<Cart, RepositoryError>;

    /// Add units of an item, creating the line or increasing its quantity.
    async fn add_to_cart(
        &self,
        customer: CustomerId,
        item: FoodItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError>;

    /// Set a line's quantity. Fails with `NotFound` if the line is not the
    /// customer's.
    async fn set_cart_quantity(
        &self,
        customer: CustomerId,
        line: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError>;

    async fn remove_cart_line(
        &self,
        customer: CustomerId,
        line: CartItemId,
    ) -> Result<(), RepositoryError>;

    /// Remove every line, returning how many were removed.
    async fn clear_cart(&self, customer: CustomerId) -> Result<u64, RepositoryError>;

    // Orders

    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    async fn order_by_number(&self, number: &OrderNumber)
    -> Result<Option<Order>, RepositoryError>;

    async fn order_by_checkout_request(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Newest first.
    async fn orders_for_customer(&self, customer: CustomerId)
    -> Result<Vec<Order>, RepositoryError>;

    /// Newest first.
    async fn recent_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError>;

    async fn order_items(&self, order: OrderId) -> Result<Vec<OrderItem>, RepositoryError>;

    /// Oldest first.
    async fn status_history(
        &self,
        order: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError>;

    /// Record a payment result if the payment is not yet settled.
    ///
    /// Returns `None` without writing anything when the payment status is
    /// already `completed` or `failed`.
    async fn settle_payment(
        &self,
        order: OrderId,
        settlement: &PaymentSettlement,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Apply a status transition and append its history row.
    ///
    /// Returns `None` without writing anything when the order's status is no
    /// longer `change.expected`.
    async fn change_status(&self, change: &StatusChange) -> Result<Option<Order>, RepositoryError>;

    /// Store a rating on a delivered, unrated order. Returns `None` if the
    /// order is not delivered or already rated.
    async fn record_rating(
        &self,
        order: OrderId,
        rating: i16,
        review: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// M-Pesa orders still `processing` that were placed before the cutoff.
    async fn stale_processing_orders(
        &self,
        placed_before: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError>;

    // Loyalty

    async fn loyalty_points(&self, customer: CustomerId) -> Result<i64, RepositoryError>;
}

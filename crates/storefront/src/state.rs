//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use campus_eats_shop::config::OrderSettings;
use campus_eats_shop::db::ShopRepository;
use campus_eats_shop::mpesa::PaymentGateway;
use campus_eats_shop::notify::NotificationSink;
use campus_eats_shop::services::{CartService, CatalogService, CustomerLocks, OrderService};

use crate::config::StorefrontConfig;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    carts: CartService,
    orders: OrderService,
    catalog: CatalogService,
}

impl AppState {
    /// Wire the services together.
    ///
    /// `pool` backs sessions and accounts; `store` backs carts, orders and
    /// the catalog. In production both point at the same database.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        pool: PgPool,
        store: Arc<dyn ShopRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let locks = CustomerLocks::new();
        let settings: OrderSettings = config.orders.clone();

        Self {
            inner: Arc::new(AppStateInner {
                carts: CartService::new(store.clone(), locks.clone()),
                orders: OrderService::new(store.clone(), gateway, notifier, settings, locks),
                catalog: CatalogService::new(store),
                config,
                pool,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }
}

//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use campus_eats_shop::db::ShopRepository;
use campus_eats_shop::mpesa::PaymentGateway;
use campus_eats_shop::notify::NotificationSink;
use campus_eats_shop::services::{CatalogService, CustomerLocks, OrderService};

use crate::config::AdminConfig;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    pool: PgPool,
    orders: OrderService,
    catalog: CatalogService,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AdminConfig,
        pool: PgPool,
        store: Arc<dyn ShopRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        // Staff never place orders; the lock table stays empty
        let orders = OrderService::new(
            store.clone(),
            gateway,
            notifier,
            config.orders.clone(),
            CustomerLocks::new(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                catalog: CatalogService::new(store),
                orders,
                config,
                pool,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
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

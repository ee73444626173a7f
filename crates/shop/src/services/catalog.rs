//! Menu browsing and staff catalog edits.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument};

use campus_eats_core::{Category, FoodItemId};

use crate::db::{RepositoryError, ShopRepository};
use crate::error::OrderError;
use crate::models::{FoodItem, NewFoodItem};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn ShopRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(store: Arc<dyn ShopRepository>) -> Self {
        Self { store }
    }

    /// Orderable items, featured first, then most popular.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the store fails.
    pub async fn menu(&self, category: Option<Category>) -> Result<Vec<FoodItem>, OrderError> {
        Ok(self.store.menu(category).await?)
    }

    /// Every item including unavailable ones.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the store fails.
    pub async fn all_items(&self) -> Result<Vec<FoodItem>, OrderError> {
        Ok(self.store.catalog_items().await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the item does not exist.
    pub async fn item(&self, id: FoodItemId) -> Result<FoodItem, OrderError> {
        self.store
            .food_item(id)
            .await?
            .ok_or_else(|| OrderError::NotFound("menu item".to_string()))
    }

    /// # Errors
    ///
    /// Returns `Validation` for a blank name or a negative price.
    #[instrument(skip(self, item), fields(name = %item.name))]
    pub async fn create_item(&self, item: &NewFoodItem) -> Result<FoodItem, OrderError> {
        if item.name.trim().is_empty() {
            return Err(OrderError::Validation("name is required".to_string()));
        }
        validate_price(item.price)?;
        if item.prep_time_minutes < 0 {
            return Err(OrderError::Validation(
                "preparation time cannot be negative".to_string(),
            ));
        }

        let created = self.store.create_food_item(item).await?;
        info!(item = %created.id, "Menu item created");
        Ok(created)
    }

    /// Mark an item orderable or not. Existing cart lines stay but block checkout.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the item does not exist.
    #[instrument(skip(self))]
    pub async fn set_availability(
        &self,
        id: FoodItemId,
        available: bool,
    ) -> Result<FoodItem, OrderError> {
        let item = self
            .store
            .set_item_availability(id, available)
            .await
            .map_err(item_error)?;
        info!(available, "Menu item availability changed");
        Ok(item)
    }

    /// Change an item's price. Carts pick it up on their next read; placed
    /// orders keep the price they were placed at.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a negative price, `NotFound` for an unknown item.
    #[instrument(skip(self))]
    pub async fn set_price(&self, id: FoodItemId, price: Decimal) -> Result<FoodItem, OrderError> {
        validate_price(price)?;
        let item = self
            .store
            .set_item_price(id, price)
            .await
            .map_err(item_error)?;
        info!(price = %item.price, "Menu item price changed");
        Ok(item)
    }
}

fn validate_price(price: Decimal) -> Result<(), OrderError> {
    if price.is_sign_negative() {
        return Err(OrderError::Validation(
            "price cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn item_error(error: RepositoryError) -> OrderError {
    match error {
        RepositoryError::NotFound => OrderError::NotFound("menu item".to_string()),
        other => OrderError::Repository(other),
    }
}

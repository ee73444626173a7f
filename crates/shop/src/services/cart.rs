//! Cart management.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument};

use campus_eats_core::{CartItemId, Category, CustomerId, FoodItemId};

use crate::db::{RepositoryError, ShopRepository};
use crate::error::OrderError;
use crate::models::{Cart, CartLine};

use super::locks::CustomerLocks;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 99;

/// A cart line with its computed total.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub line: CartLine,
    pub line_total: Decimal,
}

/// Cart contents with derived values, computed on every read.
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    pub lines: Vec<CartLineView>,
    pub item_count: i64,
    pub subtotal: Decimal,
    pub category: Option<Category>,
}

impl From<Cart> for CartSummary {
    fn from(cart: Cart) -> Self {
        let item_count = cart.item_count();
        let subtotal = cart.subtotal();
        let category = cart.category();
        let lines = cart
            .lines
            .into_iter()
            .map(|line| CartLineView {
                line_total: line.line_total(),
                line,
            })
            .collect();

        Self {
            lines,
            item_count,
            subtotal,
            category,
        }
    }
}

/// Adds, updates and removes cart lines, keeping every cart single-category.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn ShopRepository>,
    locks: CustomerLocks,
}

impl CartService {
    /// `locks` should be shared with the order service so cart edits and
    /// checkout for one customer never interleave.
    #[must_use]
    pub fn new(store: Arc<dyn ShopRepository>, locks: CustomerLocks) -> Self {
        Self { store, locks }
    }

    /// Add `quantity` units of a menu item.
    ///
    /// # Errors
    ///
    /// - `Validation` for a quantity outside `1..=99` (after merging with an
    ///   existing line) or an unavailable item
    /// - `NotFound` if the item does not exist
    /// - `CategoryMismatch` if the cart already holds the other category
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        customer: CustomerId,
        item: FoodItemId,
        quantity: i32,
    ) -> Result<CartSummary, OrderError> {
        if quantity < 1 {
            return Err(OrderError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        self.locks
            .run(customer, async {
                let food = self
                    .store
                    .food_item(item)
                    .await?
                    .ok_or_else(|| OrderError::NotFound("menu item".to_string()))?;
                if !food.is_available {
                    return Err(OrderError::Validation(format!(
                        "{} is currently unavailable",
                        food.name
                    )));
                }

                let cart = self.store.cart(customer).await?;
                if let Some(existing) = cart.category() {
                    if existing != food.category {
                        return Err(OrderError::CategoryMismatch {
                            existing,
                            attempted: food.category,
                        });
                    }
                }

                let already = cart
                    .lines
                    .iter()
                    .find(|line| line.food_item_id == item)
                    .map_or(0, |line| line.quantity);
                if already.saturating_add(quantity) > MAX_LINE_QUANTITY {
                    return Err(OrderError::Validation(format!(
                        "at most {MAX_LINE_QUANTITY} of one item per order"
                    )));
                }

                self.store.add_to_cart(customer, item, quantity).await?;
                debug!(item = %item, quantity, "Added to cart");
                self.view_unlocked(customer).await
            })
            .await
    }

    /// Set a line's quantity; zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line is not in this customer's cart.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        customer: CustomerId,
        line: CartItemId,
        quantity: i32,
    ) -> Result<CartSummary, OrderError> {
        if quantity > MAX_LINE_QUANTITY {
            return Err(OrderError::Validation(format!(
                "at most {MAX_LINE_QUANTITY} of one item per order"
            )));
        }

        self.locks
            .run(customer, async {
                let result = if quantity <= 0 {
                    self.store.remove_cart_line(customer, line).await
                } else {
                    self.store.set_cart_quantity(customer, line, quantity).await
                };
                result.map_err(cart_line_error)?;
                self.view_unlocked(customer).await
            })
            .await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line is not in this customer's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        customer: CustomerId,
        line: CartItemId,
    ) -> Result<CartSummary, OrderError> {
        self.locks
            .run(customer, async {
                self.store
                    .remove_cart_line(customer, line)
                    .await
                    .map_err(cart_line_error)?;
                self.view_unlocked(customer).await
            })
            .await
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the store fails.
    #[instrument(skip(self))]
    pub async fn clear(&self, customer: CustomerId) -> Result<(), OrderError> {
        self.locks
            .run(customer, async {
                let removed = self.store.clear_cart(customer).await?;
                debug!(removed, "Cleared cart");
                Ok(())
            })
            .await
    }

    /// Current cart with live prices.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the store fails.
    pub async fn view(&self, customer: CustomerId) -> Result<CartSummary, OrderError> {
        self.view_unlocked(customer).await
    }

    async fn view_unlocked(&self, customer: CustomerId) -> Result<CartSummary, OrderError> {
        Ok(self.store.cart(customer).await?.into())
    }
}

fn cart_line_error(error: RepositoryError) -> OrderError {
    match error {
        RepositoryError::NotFound => OrderError::NotFound("cart item".to_string()),
        other => OrderError::Repository(other),
    }
}

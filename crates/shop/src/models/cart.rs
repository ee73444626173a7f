//! Cart lines and derived cart totals.

use rust_decimal::Decimal;
use serde::Serialize;

use campus_eats_core::{CartItemId, Category, CustomerId, FoodItemId};

/// One cart line joined with the current catalog data for its item.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub id: CartItemId,
    pub food_item_id: FoodItemId,
    pub name: String,
    /// Current catalog price, not a snapshot.
    pub unit_price: Decimal,
    pub category: Category,
    pub is_available: bool,
    pub quantity: i32,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A customer's cart as read from the store.
///
/// Totals are computed from the lines on every call and never cached.
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    pub customer_id: CustomerId,
    pub lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> i64 {
        self.lines.iter().map(|line| i64::from(line.quantity)).sum()
    }

    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Category shared by every line, or `None` for an empty cart.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.lines.first().map(|line| line.category)
    }

    #[must_use]
    pub fn line(&self, id: CartItemId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(id: i32, price: Decimal, quantity: i32) -> CartLine {
        CartLine {
            id: CartItemId::new(id),
            food_item_id: FoodItemId::new(id),
            name: format!("item {id}"),
            unit_price: price,
            category: Category::Food,
            is_available: true,
            quantity,
        }
    }

    #[test]
    fn test_totals_follow_lines() {
        let mut cart = Cart {
            customer_id: CustomerId::new(1),
            lines: vec![line(1, dec!(100), 2), line(2, dec!(50), 1)],
        };
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.subtotal(), dec!(250));

        cart.lines[0].quantity = 3;
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.subtotal(), dec!(350));
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart {
            customer_id: CustomerId::new(1),
            lines: Vec::new(),
        };
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), Decimal::ZERO);
        assert_eq!(cart.category(), None);
    }
}

//! Catalog items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use campus_eats_core::{Category, FoodItemId};

/// A purchasable menu entry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FoodItem {
    pub id: FoodItemId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: Category,
    pub is_available: bool,
    pub is_featured: bool,
    /// Units sold across confirmed orders.
    pub times_ordered: i64,
    pub prep_time_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for adding a catalog item (used by the seed command).
#[derive(Debug, Clone, Deserialize)]
pub struct NewFoodItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub category: Category,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_prep_time")]
    pub prep_time_minutes: i32,
}

impl NewFoodItem {
    /// An available, non-featured item with the default preparation time.
    #[must_use]
    pub fn new(name: impl Into<String>, price: Decimal, category: Category) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            price,
            category,
            is_available: true,
            is_featured: false,
            prep_time_minutes: default_prep_time(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_prep_time() -> i32 {
    15
}

//! Seed the catalog from a JSON file.
//!
//! The file holds an array of menu items:
//!
//! ```json
//! [
//!   { "name": "Chapati Beans", "price": "120", "category": "food" },
//!   { "name": "Tusker 500ml", "price": "250", "category": "liquor", "prep_time_minutes": 5 }
//! ]
//! ```
//!
//! Items are inserted one by one; an invalid item is reported and skipped.

use std::path::Path;

use thiserror::Error;
use tracing::{error, info};

use campus_eats_shop::db::PgShopRepository;
use campus_eats_shop::models::NewFoodItem;
use campus_eats_shop::services::CatalogService;

use super::{CommandError, connect};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid menu file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0} items failed to insert")]
    Failed(usize),
}

/// Parse a menu file's contents.
pub fn parse_menu(content: &str) -> Result<Vec<NewFoodItem>, serde_json::Error> {
    serde_json::from_str(content)
}

/// Insert every item from `file`.
pub async fn menu(file: &Path) -> Result<(), SeedError> {
    // Parse before connecting so a typo fails fast
    let content = tokio::fs::read_to_string(file)
        .await
        .map_err(|source| SeedError::Read {
            path: file.display().to_string(),
            source,
        })?;
    let items = parse_menu(&content)?;
    info!(items = items.len(), "Parsed menu file");

    let pool = connect().await?;
    let catalog = CatalogService::new(std::sync::Arc::new(PgShopRepository::new(pool)));

    let mut failed = 0;
    for item in &items {
        match catalog.create_item(item).await {
            Ok(created) => info!(id = %created.id, name = %created.name, "Inserted"),
            Err(e) => {
                error!(name = %item.name, error = %e, "Failed to insert");
                failed += 1;
            }
        }
    }

    info!(inserted = items.len() - failed, "Seeding complete!");
    if failed > 0 {
        return Err(SeedError::Failed(failed));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use campus_eats_core::Category;
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_parse_menu_applies_defaults() {
        let items = parse_menu(
            r#"[
                {"name": "Pilau", "price": "180", "category": "food"},
                {"name": "Gilbey's 250ml", "price": "450", "category": "liquor",
                 "is_available": false, "prep_time_minutes": 5}
            ]"#,
        )
        .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price, Decimal::from(180));
        assert_eq!(items[0].category, Category::Food);
        assert!(items[0].is_available);
        assert_eq!(items[1].category, Category::Liquor);
        assert!(!items[1].is_available);
        assert_eq!(items[1].prep_time_minutes, 5);
    }

    #[test]
    fn test_parse_menu_rejects_unknown_category() {
        assert!(parse_menu(r#"[{"name": "Mandazi", "price": "20", "category": "snacks"}]"#).is_err());
    }
}

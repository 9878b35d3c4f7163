//! Seed the product table from a YAML file.
//!
//! The file is a list of product inputs:
//!
//! ```yaml
//! - name: Flash light
//!   description: High-intensity LED flashlight
//!   price: "49.99"
//!   inventory: 25
//! - name: Power bank
//!   price: "19.50"
//!   inventory: 100
//! ```
//!
//! Every entry is validated before the database is touched; one bad entry
//! aborts the whole seed.

use std::path::Path;

use tracing::{error, info};

use flash_sale_core::{NewProduct, ProductInput};
use flash_sale_inventory::config::InventoryConfig;
use flash_sale_inventory::db::{self, PgProductStore, ProductStore};

use super::CommandError;

/// Seed products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any entry is
/// invalid, or an insert fails.
pub async fn run(path: &Path) -> Result<(), CommandError> {
    info!(path = %path.display(), "Loading products from file");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let products = parse_products(&content)?;
    info!(count = products.len(), "Seed file validated");

    let config = InventoryConfig::from_env()?;
    let pool = db::create_pool(&config.database_url, 2).await?;
    let store = PgProductStore::new(pool);

    for product in &products {
        let stored = store.insert(product).await?;
        info!(id = %stored.id, name = %stored.name, inventory = stored.inventory, "Inserted product");
    }

    info!(inserted = products.len(), "Seeding complete!");
    Ok(())
}

/// Parse and validate every entry, logging each problem.
fn parse_products(content: &str) -> Result<Vec<NewProduct>, CommandError> {
    let inputs: Vec<ProductInput> = serde_yaml::from_str(content)?;

    let mut products = Vec::with_capacity(inputs.len());
    let mut invalid = 0;
    for (index, input) in inputs.into_iter().enumerate() {
        match input.validate() {
            Ok(product) => products.push(product),
            Err(e) => {
                error!(entry = index + 1, "  - {e}");
                invalid += 1;
            }
        }
    }

    if invalid > 0 {
        return Err(CommandError::Invalid(invalid));
    }
    Ok(products)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_parse_products() {
        let yaml = r#"
- name: Flash light
  description: High-intensity LED flashlight
  price: "49.99"
  inventory: 25
- name: Power bank
  price: "19.50"
  inventory: 100
"#;
        let products = parse_products(yaml).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Flash light");
        assert_eq!(products[0].price.amount(), Decimal::new(4999, 2));
        assert_eq!(products[1].description, None);
        assert_eq!(products[1].inventory, 100);
    }

    #[test]
    fn test_parse_products_rejects_invalid_entries() {
        let yaml = r#"
- name: Flash light
  price: "49.99"
  inventory: 25
- name: ""
  price: "1.00"
  inventory: 1
- name: Broken
  price: "-2"
  inventory: 3
"#;
        assert!(matches!(
            parse_products(yaml),
            Err(CommandError::Invalid(2))
        ));
    }

    #[test]
    fn test_parse_products_rejects_malformed_yaml() {
        assert!(matches!(
            parse_products("name: [unclosed"),
            Err(CommandError::Parse(_))
        ));
    }
}

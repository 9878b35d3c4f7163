//! Product records and the field set callers submit to create or update them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::{Price, PriceError};

/// A product as stored in the durable store.
///
/// The cache holds JSON copies of this type; those copies may be stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Store-assigned identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Optional long description.
    pub description: Option<String>,
    /// Unit price.
    pub price: Price,
    /// Units available, as last written to the store.
    pub inventory: i32,
    /// When the store created the row.
    pub created_at: DateTime<Utc>,
}

/// Raw product fields as submitted by a caller.
///
/// Every field is optional at the parse level so that missing fields surface
/// as a [`ValidationError`] listing all of them, not as a body parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub inventory: Option<i32>,
}

/// Validated fields for inserting or overwriting a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub inventory: i32,
}

/// Reasons a [`ProductInput`] cannot become a [`NewProduct`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// One or more required fields were absent (or the name was blank).
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    /// Price below zero.
    #[error("price must not be negative")]
    NegativePrice,
    /// Price beyond what the store can hold.
    #[error("price must not exceed {}", Price::max_amount())]
    PriceTooLarge,
    /// Inventory below zero.
    #[error("inventory must not be negative")]
    NegativeInventory,
}

impl ProductInput {
    /// Validate the input.
    ///
    /// A blank (whitespace-only) name counts as missing. Missing fields are
    /// reported together, in `name, price, inventory` order, before any range
    /// checks run.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` describing the first class of problem found.
    pub fn validate(self) -> Result<NewProduct, ValidationError> {
        let name = self
            .name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty());

        let mut missing = Vec::new();
        if name.is_none() {
            missing.push("name");
        }
        if self.price.is_none() {
            missing.push("price");
        }
        if self.inventory.is_none() {
            missing.push("inventory");
        }

        let (Some(name), Some(price), Some(inventory)) = (name, self.price, self.inventory) else {
            return Err(ValidationError::MissingFields(missing));
        };

        let price = Price::new(price).map_err(|err| match err {
            PriceError::Negative(_) => ValidationError::NegativePrice,
            PriceError::TooLarge(_) => ValidationError::PriceTooLarge,
        })?;
        if inventory < 0 {
            return Err(ValidationError::NegativeInventory);
        }

        Ok(NewProduct {
            name,
            description: self.description,
            price,
            inventory,
        })
    }
}

impl NewProduct {
    /// Build the stored record once the store has assigned an id and timestamp.
    #[must_use]
    pub fn into_product(self, id: ProductId, created_at: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            inventory: self.inventory,
            created_at,
        }
    }
}

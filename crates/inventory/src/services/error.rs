//! Errors returned by the inventory service.

use thiserror::Error;

use flash_sale_core::{ProductId, ValidationError};

use crate::cache::CacheError;
use crate::db::RepositoryError;

/// Inventory service errors.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// No product with this id.
    #[error("product {0} not found")]
    NotFound(ProductId),

    /// The catalog has no products at all.
    #[error("no products found")]
    CatalogEmpty,

    /// The submitted product fields are invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No units left to sell.
    #[error("product {0} is out of stock")]
    OutOfStock(ProductId),

    /// The atomic decrement could not be performed. No unit was taken.
    #[error("purchase of product {id} failed: {reason}")]
    PurchaseFailed { id: ProductId, reason: String },

    /// A cache-only operation failed.
    #[error("cache error: {0}")]
    CacheUnavailable(#[from] CacheError),

    /// The durable store failed.
    #[error("store error: {0}")]
    Store(#[from] RepositoryError),
}

/// Coarse classification for transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    /// The caller sent something unacceptable or asked for the impossible.
    Client,
    Server,
}

impl InventoryError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) | Self::CatalogEmpty => ErrorClass::NotFound,
            Self::Validation(_)
            | Self::OutOfStock(_)
            | Self::Store(RepositoryError::Conflict(_)) => ErrorClass::Client,
            Self::PurchaseFailed { .. } | Self::CacheUnavailable(_) | Self::Store(_) => {
                ErrorClass::Server
            }
        }
    }
}

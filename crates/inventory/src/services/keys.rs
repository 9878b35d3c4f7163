//! Cache key families derived from a product id.

use std::fmt;

use flash_sale_core::ProductId;

/// A cache key. The rendered form is stable across restarts and shared by
/// every instance pointing at the same cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// JSON copy of the product: `product:{id}`.
    Product(ProductId),
    /// Authoritative purchase counter: `inventory:{id}`.
    Inventory(ProductId),
    /// View counter: `views:{id}`.
    Views(ProductId),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product(id) => write!(f, "product:{id}"),
            Self::Inventory(id) => write!(f, "inventory:{id}"),
            Self::Views(id) => write!(f, "views:{id}"),
        }
    }
}

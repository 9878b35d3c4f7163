//! Business logic services for the inventory service.
//!
//! # Services
//!
//! - `inventory` - Cache-aside reads, write invalidation, oversell-safe
//!   purchases and view counting
//! - `keys` - Cache key families
//! - `error` - Service errors and their classification

pub mod error;
pub mod inventory;
pub mod keys;

pub use error::{ErrorClass, InventoryError};
pub use inventory::{InventoryService, PurchaseReceipt, Sourced};
pub use keys::CacheKey;

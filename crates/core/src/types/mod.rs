//! Core types for the flash sale service.
//!
//! This module provides type-safe wrappers for the product domain.

pub mod id;
pub mod price;
pub mod product;
pub mod source;

pub use id::*;
pub use price::{Price, PriceError};
pub use product::{NewProduct, Product, ProductInput, ValidationError};
pub use source::Source;

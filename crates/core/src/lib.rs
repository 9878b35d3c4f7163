//! Flash Sale Core - Shared types library.
//!
//! This crate provides the types shared by every flash sale component:
//! - `inventory` - The inventory service (HTTP API, cache-aside protocol)
//! - `cli` - Command-line tools for migrations, seeding and cache maintenance
//! - `integration-tests` - Scenario tests against test doubles
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no cache clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Product ids, prices, product records and request inputs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

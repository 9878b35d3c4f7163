//! Database operations for the inventory `PostgreSQL` store.
//!
//! # Database: `flash_sale`
//!
//! The store is the durable source of truth. The cache only ever holds copies
//! derived from it.
//!
//! ## Tables
//!
//! - `products` - Catalog with per-product inventory count
//!
//! # Migrations
//!
//! Migrations are stored in `crates/inventory/migrations/`, embedded in the
//! binary and run via:
//! ```bash
//! cargo run -p flash-sale-cli -- migrate
//! ```

mod products;

pub use products::PgProductStore;

use std::future::Future;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use flash_sale_core::{NewProduct, Product, ProductId};

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The row was rejected by a constraint or column range.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
/// * `max_connections` - Pool size
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Apply pending migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the applied history diverges.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Durable product storage.
///
/// "Not found" is never an error here: lookups return `None` and writes report
/// the number of rows they touched.
pub trait ProductStore: Send + Sync + 'static {
    /// Fetch one product.
    fn get_by_id(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, RepositoryError>> + Send;

    /// Fetch every product whose id is in `ids`, in no particular order.
    /// Unknown ids are skipped.
    fn get_by_ids(
        &self,
        ids: &[ProductId],
    ) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;

    /// All product ids in ascending order.
    fn get_all_ids(&self) -> impl Future<Output = Result<Vec<ProductId>, RepositoryError>> + Send;

    /// Insert a product and return the stored row with its new id and timestamp.
    fn insert(
        &self,
        product: &NewProduct,
    ) -> impl Future<Output = Result<Product, RepositoryError>> + Send;

    /// Overwrite every mutable field of a product. Returns rows affected.
    fn update(
        &self,
        id: ProductId,
        product: &NewProduct,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    /// Delete a product. Returns rows affected.
    fn delete(&self, id: ProductId) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    /// Overwrite the inventory count. Returns rows affected.
    fn set_inventory(
        &self,
        id: ProductId,
        inventory: i32,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    /// Check the store is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// SQLSTATE for a value outside a column's numeric range.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// Map constraint violations and out-of-range values to `Conflict`,
/// everything else to `Database`.
pub(crate) fn classify(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && (db_err.is_check_violation()
            || db_err.is_unique_violation()
            || db_err.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE))
    {
        return RepositoryError::Conflict(db_err.message().to_owned());
    }
    RepositoryError::Database(err)
}

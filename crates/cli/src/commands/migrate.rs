//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! flash-sale-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `INVENTORY_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! Migrations live in `crates/inventory/migrations/` and are embedded in the
//! inventory crate at build time.

use tracing::info;

use flash_sale_inventory::config::InventoryConfig;
use flash_sale_inventory::db;

use super::CommandError;

/// Run pending migrations.
///
/// # Errors
///
/// Returns an error if configuration is missing, the database is unreachable
/// or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let config = InventoryConfig::from_env()?;

    info!("Connecting to inventory database...");
    let pool = db::create_pool(&config.database_url, 1).await?;

    info!("Running inventory migrations...");
    db::run_migrations(&pool).await?;

    info!("Inventory migrations complete!");
    Ok(())
}

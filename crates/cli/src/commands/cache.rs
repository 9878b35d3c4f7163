//! Cache maintenance commands.

use tracing::info;

use flash_sale_inventory::cache::CacheStore;
use flash_sale_inventory::config::InventoryConfig;
use flash_sale_inventory::connect_cache;

use super::CommandError;

/// Flush the configured cache backend.
///
/// Only meaningful for Redis: the memory backend lives inside each server
/// process, so flushing a fresh one from here is a no-op.
///
/// # Errors
///
/// Returns an error if configuration is missing or the cache is unreachable.
pub async fn flush() -> Result<(), CommandError> {
    let config = InventoryConfig::from_env()?;
    let cache = connect_cache(&config.cache).await?;

    cache.flush_all().await?;
    info!(backend = cache.backend_name(), "Cache flushed");
    Ok(())
}

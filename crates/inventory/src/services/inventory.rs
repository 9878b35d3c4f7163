//! Inventory consistency service.
//!
//! Orchestrates the cache and the durable store:
//!
//! - **Reads** are cache-aside. A hit is served from the cache; a miss (or a
//!   cache failure, or an undecodable entry) falls through to the store and
//!   repopulates the cache best-effort.
//! - **Writes** go to the store first, then invalidate the cached product
//!   entry; delete also drops the counter. The new value is never written
//!   into the cache on update, so a stale read-populate racing the update can
//!   at worst live for one TTL.
//! - **Purchases** decrement the `inventory:{id}` counter atomically in the
//!   cache. Once seeded, that counter is the only arbiter of who gets the last
//!   unit; the store is brought in line afterwards.
//! - **Views** live only in the cache.
//!
//! Cache failures on read and invalidation paths are logged and absorbed.
//! Store failures always propagate.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use flash_sale_core::{Product, ProductId, ProductInput, Source};

use super::error::InventoryError;
use super::keys::CacheKey;
use crate::cache::{CacheError, CacheStore, Decrement, parse_counter};
use crate::config::CacheTtls;
use crate::db::ProductStore;

/// A value together with where it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: Source,
}

impl<T> Sourced<T> {
    const fn cache(value: T) -> Self {
        Self {
            value,
            source: Source::Cache,
        }
    }

    const fn store(value: T) -> Self {
        Self {
            value,
            source: Source::Store,
        }
    }
}

/// Outcome of a committed purchase.
///
/// The unit is sold once the cache decrement succeeds. The follow-up flags
/// report the best-effort steps that came after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub product_id: ProductId,
    /// Units left according to the inventory counter.
    pub remaining: u64,
    /// Whether the store's inventory column was updated to `remaining`.
    pub store_synced: bool,
    /// Whether the cached product entry was removed.
    pub cache_invalidated: bool,
}

/// The inventory service, generic over its cache and store.
pub struct InventoryService<C, S> {
    cache: C,
    store: S,
    ttls: CacheTtls,
}

impl<C: CacheStore, S: ProductStore> InventoryService<C, S> {
    #[must_use]
    pub const fn new(cache: C, store: S, ttls: CacheTtls) -> Self {
        Self { cache, store, ttls }
    }

    #[must_use]
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch one product, preferring the cache.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::NotFound` if the store has no such product,
    /// or `InventoryError::Store` if the store lookup fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Sourced<Product>, InventoryError> {
        let key = CacheKey::Product(id).to_string();

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Product>(&raw) {
                Ok(product) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(Sourced::cache(product));
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key = %key, "Cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Cache read failed, falling back to store"),
        }

        let product = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(InventoryError::NotFound(id))?;

        self.populate(&product).await;
        Ok(Sourced::store(product))
    }

    /// Fetch the whole catalog in id order.
    ///
    /// Cached entries are fetched in one batch; the misses are loaded from the
    /// store in one query and cached.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::CatalogEmpty` if there are no products, or
    /// `InventoryError::Store` if a store query fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, InventoryError> {
        let ids = self.store.get_all_ids().await?;
        if ids.is_empty() {
            return Err(InventoryError::CatalogEmpty);
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| CacheKey::Product(*id).to_string())
            .collect();

        let cached = self.cache.get_multi(&keys).await.unwrap_or_else(|e| {
            warn!(error = %e, "Batch cache read failed, loading everything from store");
            HashMap::new()
        });

        let mut found: HashMap<ProductId, Product> = HashMap::with_capacity(ids.len());
        let mut misses = Vec::new();
        for (id, key) in ids.iter().zip(&keys) {
            match cached.get(key).map(|raw| serde_json::from_str::<Product>(raw)) {
                Some(Ok(product)) => {
                    found.insert(*id, product);
                }
                Some(Err(e)) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    misses.push(*id);
                }
                None => misses.push(*id),
            }
        }

        debug!(
            total = ids.len(),
            hits = found.len(),
            misses = misses.len(),
            "Catalog cache lookup"
        );

        if !misses.is_empty() {
            for product in self.store.get_by_ids(&misses).await? {
                self.populate(&product).await;
                found.insert(product.id, product);
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Validate and insert a product, then cache it.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Validation` for invalid input, or
    /// `InventoryError::Store` if the insert fails.
    #[instrument(skip(self, input))]
    pub async fn create_product(&self, input: ProductInput) -> Result<Product, InventoryError> {
        let new_product = input.validate()?;
        let product = self.store.insert(&new_product).await?;

        info!(product_id = %product.id, name = %product.name, "Product created");
        self.populate(&product).await;
        Ok(product)
    }

    /// Validate and overwrite a product, then invalidate its cached entry.
    ///
    /// A live `inventory:{id}` counter is left alone and stays authoritative
    /// until it expires. An inventory change made here takes effect when the
    /// counter is next seeded from the store.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Validation` for invalid input,
    /// `InventoryError::NotFound` if no row was updated, or
    /// `InventoryError::Store` if the update fails.
    #[instrument(skip(self, input), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        input: ProductInput,
    ) -> Result<(), InventoryError> {
        let new_product = input.validate()?;
        if self.store.update(id, &new_product).await? == 0 {
            return Err(InventoryError::NotFound(id));
        }

        info!("Product updated");
        self.invalidate(CacheKey::Product(id)).await;
        Ok(())
    }

    /// Delete a product and invalidate its cache entries.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::NotFound` if no row was deleted (the cache is
    /// left untouched), or `InventoryError::Store` if the delete fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), InventoryError> {
        if self.store.delete(id).await? == 0 {
            return Err(InventoryError::NotFound(id));
        }

        info!("Product deleted");
        self.invalidate(CacheKey::Product(id)).await;
        self.invalidate(CacheKey::Inventory(id)).await;
        Ok(())
    }

    // =========================================================================
    // Purchase
    // =========================================================================

    /// Sell one unit.
    ///
    /// The sale is decided by the atomic decrement of `inventory:{id}`.
    /// Concurrent purchases against `K` units produce exactly `K` successes.
    /// After the decrement the store's inventory is overwritten and the
    /// product entry invalidated; neither follow-up can undo the sale.
    ///
    /// # Errors
    ///
    /// - `InventoryError::NotFound` if the counter had to be seeded and the
    ///   store has no such product
    /// - `InventoryError::OutOfStock` if no units remain
    /// - `InventoryError::PurchaseFailed` if the decrement could not be
    ///   performed
    /// - `InventoryError::Store` if seeding hit a store failure
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn purchase(&self, id: ProductId) -> Result<PurchaseReceipt, InventoryError> {
        let key = CacheKey::Inventory(id).to_string();

        let available = match self.read_counter(&key).await {
            Some(value) => value,
            None => self.seed_inventory(id, &key).await?,
        };

        if available == 0 {
            debug!(key = %key, "Counter already at zero");
            return Err(InventoryError::OutOfStock(id));
        }

        let remaining = match self.cache.decrement(&key, 1).await {
            Ok(Some(Decrement::Applied(remaining))) => remaining,
            Ok(Some(Decrement::Exhausted)) => {
                debug!(key = %key, "Lost the race for the last unit");
                return Err(InventoryError::OutOfStock(id));
            }
            Ok(None) => {
                warn!(key = %key, "Inventory counter vanished before decrement");
                return Err(InventoryError::PurchaseFailed {
                    id,
                    reason: "inventory counter missing".to_string(),
                });
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Inventory decrement failed");
                return Err(InventoryError::PurchaseFailed {
                    id,
                    reason: e.to_string(),
                });
            }
        };

        let store_synced = self.sync_inventory(id, remaining).await;
        let cache_invalidated = self.invalidate(CacheKey::Product(id)).await;

        info!(remaining, store_synced, cache_invalidated, "Purchase committed");
        Ok(PurchaseReceipt {
            product_id: id,
            remaining,
            store_synced,
            cache_invalidated,
        })
    }

    /// Read the inventory counter. Failures and corrupt values read as a miss;
    /// a corrupt value is also deleted so it gets reseeded.
    async fn read_counter(&self, key: &str) -> Option<u64> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Inventory counter read failed, treating as miss");
                return None;
            }
        };

        match parse_counter(key, &raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Dropping corrupt inventory counter");
                if let Err(e) = self.cache.delete(key).await {
                    warn!(key, error = %e, "Failed to drop corrupt inventory counter");
                }
                None
            }
        }
    }

    /// Seed the inventory counter from the store with set-if-absent.
    ///
    /// If another request seeded it first, its value wins. If seeding fails
    /// outright the store value is returned and the decrement that follows
    /// will find no counter.
    async fn seed_inventory(&self, id: ProductId, key: &str) -> Result<u64, InventoryError> {
        let product = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(InventoryError::NotFound(id))?;
        let from_store = u64::try_from(product.inventory).unwrap_or(0);

        match self
            .cache
            .add(key, &from_store.to_string(), self.ttls.inventory)
            .await
        {
            Ok(true) => {
                debug!(key, value = from_store, "Seeded inventory counter");
                Ok(from_store)
            }
            Ok(false) => {
                debug!(key, "Inventory counter seeded concurrently, re-reading");
                Ok(self.read_counter(key).await.unwrap_or(from_store))
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to seed inventory counter");
                Ok(from_store)
            }
        }
    }

    /// Write the post-decrement count back to the store.
    async fn sync_inventory(&self, id: ProductId, remaining: u64) -> bool {
        let Ok(value) = i32::try_from(remaining) else {
            warn!(remaining, "Remaining inventory out of range for store");
            return false;
        };

        match self.store.set_inventory(id, value).await {
            Ok(0) => {
                warn!("Product vanished from store during purchase");
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Failed to sync inventory to store");
                false
            }
        }
    }

    // =========================================================================
    // Views and maintenance
    // =========================================================================

    /// Count a view and return the new total for the current TTL window.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::CacheUnavailable` if the cache fails; views
    /// have no other home.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn record_view(&self, id: ProductId) -> Result<u64, InventoryError> {
        let key = CacheKey::Views(id).to_string();

        if let Some(views) = self.cache.increment(&key, 1).await? {
            return Ok(views);
        }

        if self.cache.add(&key, "1", self.ttls.views).await? {
            return Ok(1);
        }

        // Someone else started the window between our increment and add.
        self.cache.increment(&key, 1).await?.ok_or_else(|| {
            InventoryError::CacheUnavailable(CacheError::Command(format!(
                "{key} expired while counting"
            )))
        })
    }

    /// Drop every cache entry.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::CacheUnavailable` if the flush fails.
    #[instrument(skip(self))]
    pub async fn flush_cache(&self) -> Result<(), InventoryError> {
        self.cache.flush_all().await?;
        info!(backend = self.cache.backend_name(), "Cache flushed");
        Ok(())
    }

    /// Check the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Store` if it is not.
    pub async fn ping_store(&self) -> Result<(), InventoryError> {
        Ok(self.store.ping().await?)
    }

    // =========================================================================
    // Cache helpers
    // =========================================================================

    /// Best-effort write of a product's JSON copy.
    async fn populate(&self, product: &Product) {
        let key = CacheKey::Product(product.id).to_string();
        let json = match serde_json::to_string(product) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize product for cache");
                return;
            }
        };

        if let Err(e) = self.cache.set(&key, &json, self.ttls.product).await {
            warn!(key = %key, error = %e, "Failed to populate cache");
        }
    }

    /// Best-effort delete. Returns whether the cache acknowledged it.
    async fn invalidate(&self, key: CacheKey) -> bool {
        let key = key.to_string();
        match self.cache.delete(&key).await {
            Ok(_) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to invalidate cache entry");
                false
            }
        }
    }
}

//! Application state shared across handlers.

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::db::ProductStore;
use crate::services::InventoryService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. It is generic over the cache
/// and store so tests can run the full router against in-memory doubles.
pub struct AppState<C, S> {
    inner: Arc<InventoryService<C, S>>,
}

// Manual impl: a derive would require `C: Clone + S: Clone`.
impl<C, S> Clone for AppState<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: CacheStore, S: ProductStore> AppState<C, S> {
    /// Create a new application state around a constructed service.
    #[must_use]
    pub fn new(service: InventoryService<C, S>) -> Self {
        Self {
            inner: Arc::new(service),
        }
    }

    /// Get a reference to the inventory service.
    #[must_use]
    pub fn inventory(&self) -> &InventoryService<C, S> {
        &self.inner
    }
}

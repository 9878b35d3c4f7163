//! Integration tests for the flash sale inventory service.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p flash-sale-integration-tests
//! ```
//!
//! Most suites need no external services: the service runs against the
//! in-process `MemoryCache` and the [`InMemoryProductStore`] double defined
//! here. [`FaultyCache`] wraps any cache to inject failures per operation
//! family, and the service sees it through the same `RetryingCache` decorator
//! production uses.
//!
//! The `redis_cache` and `postgres_store` suites are ignored by default and
//! need running servers (`REDIS_URL`, `DATABASE_URL`):
//!
//! ```bash
//! cargo test -p flash-sale-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `cache_aside` - Read-through, batch reads, write invalidation
//! - `purchase` - Oversell safety, seeding, best-effort follow-ups
//! - `views` - View counter windows
//! - `http` - Routes, status codes and bodies
//! - `redis_cache` - Lua decrement, counters and TTLs against Redis
//! - `postgres_store` - SQL queries against `PostgreSQL`

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use tick::Clock;

use flash_sale_core::{NewProduct, Product, ProductId, ProductInput};
use flash_sale_inventory::cache::{
    CacheError, CacheResult, CacheStore, Decrement, MemoryCache, RetryPolicy, RetryingCache,
};
use flash_sale_inventory::config::CacheTtls;
use flash_sale_inventory::db::{ProductStore, RepositoryError};
use flash_sale_inventory::services::{CacheKey, InventoryService};
use flash_sale_inventory::state::AppState;

// =============================================================================
// Product store double
// =============================================================================

#[derive(Default)]
struct StoreState {
    next_id: i32,
    products: BTreeMap<ProductId, Product>,
}

#[derive(Default)]
struct StoreStats {
    get_by_id: AtomicUsize,
    get_by_ids: AtomicUsize,
    set_inventory: AtomicUsize,
}

/// `ProductStore` backed by a map, with call counters and failure switches.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryProductStore {
    state: Arc<Mutex<StoreState>>,
    stats: Arc<StoreStats>,
    fail_all: Arc<AtomicBool>,
    fail_set_inventory: Arc<AtomicBool>,
}

impl InMemoryProductStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx_unavailable()));
        }
        Ok(())
    }

    /// Make every call fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Make only `set_inventory` fail.
    pub fn set_inventory_failing(&self, failing: bool) {
        self.fail_set_inventory.store(failing, Ordering::SeqCst);
    }

    /// Current stored record, bypassing counters.
    #[must_use]
    pub fn peek(&self, id: ProductId) -> Option<Product> {
        self.lock().products.get(&id).cloned()
    }

    #[must_use]
    pub fn get_by_id_calls(&self) -> usize {
        self.stats.get_by_id.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn get_by_ids_calls(&self) -> usize {
        self.stats.get_by_ids.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn set_inventory_calls(&self) -> usize {
        self.stats.set_inventory.load(Ordering::SeqCst)
    }
}

fn sqlx_unavailable() -> sqlx::Error {
    sqlx::Error::PoolTimedOut
}

impl ProductStore for InMemoryProductStore {
    async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.check()?;
        self.stats.get_by_id.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn get_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        self.check()?;
        self.stats.get_by_ids.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        // Reverse order: callers must not rely on it.
        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn get_all_ids(&self) -> Result<Vec<ProductId>, RepositoryError> {
        self.check()?;
        Ok(self.lock().products.keys().copied().collect())
    }

    async fn insert(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        self.check()?;
        let mut state = self.lock();
        state.next_id += 1;
        let id = ProductId::new(state.next_id);
        let stored = product.clone().into_product(id, Utc::now());
        state.products.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: ProductId, product: &NewProduct) -> Result<u64, RepositoryError> {
        self.check()?;
        let mut state = self.lock();
        let Some(existing) = state.products.get_mut(&id) else {
            return Ok(0);
        };
        *existing = product.clone().into_product(id, existing.created_at);
        Ok(1)
    }

    async fn delete(&self, id: ProductId) -> Result<u64, RepositoryError> {
        self.check()?;
        Ok(u64::from(self.lock().products.remove(&id).is_some()))
    }

    async fn set_inventory(&self, id: ProductId, inventory: i32) -> Result<u64, RepositoryError> {
        self.check()?;
        self.stats.set_inventory.fetch_add(1, Ordering::SeqCst);
        if self.fail_set_inventory.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx_unavailable()));
        }
        let mut state = self.lock();
        let Some(existing) = state.products.get_mut(&id) else {
            return Ok(0);
        };
        existing.inventory = inventory;
        Ok(1)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.check()
    }
}

// =============================================================================
// Cache fault injection
// =============================================================================

#[derive(Default)]
struct Switch {
    on: AtomicBool,
    /// Failures left before the family recovers on its own.
    remaining: AtomicUsize,
}

impl Switch {
    fn trips(&self) -> bool {
        self.on.load(Ordering::SeqCst)
            || self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[derive(Default)]
struct Faults {
    reads: Switch,
    writes: Switch,
    counters: Switch,
    flush: Switch,
    lose_add_reply: AtomicBool,
    mutations: AtomicUsize,
}

impl Faults {
    const fn switch(&self, fault: Fault) -> &Switch {
        match fault {
            Fault::Reads => &self.reads,
            Fault::Writes => &self.writes,
            Fault::Counters => &self.counters,
            Fault::Flush => &self.flush,
        }
    }
}

/// Operation families that can be made to fail.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// `get`, `get_multi`
    Reads,
    /// `set`, `add`, `delete`
    Writes,
    /// `increment`, `decrement`
    Counters,
    /// `flush_all`
    Flush,
}

/// A `CacheStore` wrapper that fails selected operation families on demand
/// and counts mutating calls.
///
/// Injected failures are `CacheError::Unavailable`, which the retry decorator
/// treats as transient.
///
/// Clones share the switches and the wrapped cache.
#[derive(Clone)]
pub struct FaultyCache<C> {
    inner: C,
    faults: Arc<Faults>,
}

impl<C: CacheStore> FaultyCache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    pub const fn inner(&self) -> &C {
        &self.inner
    }

    pub fn set_fault(&self, fault: Fault, on: bool) {
        self.faults.switch(fault).on.store(on, Ordering::SeqCst);
    }

    /// Fail the next `times` calls of one family, then recover.
    pub fn fail_next(&self, fault: Fault, times: usize) {
        self.faults.switch(fault).remaining.store(times, Ordering::SeqCst);
    }

    /// Apply the next `add`, then report `CacheError::Timeout` as if the reply
    /// was lost on the way back.
    pub fn lose_next_add_reply(&self) {
        self.faults.lose_add_reply.store(true, Ordering::SeqCst);
    }

    /// Make every operation fail.
    pub fn set_down(&self, down: bool) {
        for fault in [Fault::Reads, Fault::Writes, Fault::Counters, Fault::Flush] {
            self.set_fault(fault, down);
        }
    }

    /// Number of mutating calls attempted so far.
    pub fn mutations(&self) -> usize {
        self.faults.mutations.load(Ordering::SeqCst)
    }

    fn gate(&self, fault: Fault, mutating: bool) -> CacheResult<()> {
        if mutating {
            self.faults.mutations.fetch_add(1, Ordering::SeqCst);
        }
        if self.faults.switch(fault).trips() {
            return Err(CacheError::Unavailable("injected fault".to_string()));
        }
        Ok(())
    }
}

impl<C: CacheStore> CacheStore for FaultyCache<C> {
    fn backend_name(&self) -> &'static str {
        "faulty"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.gate(Fault::Reads, false)?;
        self.inner.get(key).await
    }

    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        self.gate(Fault::Reads, false)?;
        self.inner.get_multi(keys).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.gate(Fault::Writes, true)?;
        self.inner.set(key, value, ttl).await
    }

    async fn add(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        self.gate(Fault::Writes, true)?;
        let added = self.inner.add(key, value, ttl).await?;
        if self.faults.lose_add_reply.swap(false, Ordering::SeqCst) {
            return Err(CacheError::Timeout("reply lost".to_string()));
        }
        Ok(added)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.gate(Fault::Writes, true)?;
        self.inner.delete(key).await
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        self.gate(Fault::Counters, true)?;
        self.inner.increment(key, delta).await
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<Option<Decrement>> {
        self.gate(Fault::Counters, true)?;
        self.inner.decrement(key, delta).await
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.gate(Fault::Flush, true)?;
        self.inner.flush_all().await
    }
}

// =============================================================================
// Test context
// =============================================================================

pub type TestCache = FaultyCache<MemoryCache>;
/// What the service sees: the fault switches behind the retry decorator.
pub type ServiceCache = RetryingCache<TestCache>;
pub type TestService = InventoryService<ServiceCache, InMemoryProductStore>;

/// Short backoffs so exhausted retries stay fast.
#[must_use]
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(2)
        .with_delays(Duration::from_millis(1), Duration::from_millis(2))
        .with_attempt_timeout(Duration::from_millis(250))
}

/// A fully wired service over in-memory doubles.
pub struct TestContext {
    /// Fault switches; shared with the cache inside the service.
    pub cache: TestCache,
    pub store: InMemoryProductStore,
    pub state: AppState<ServiceCache, InMemoryProductStore>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttls(CacheTtls::default())
    }

    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn with_ttls(ttls: CacheTtls) -> Self {
        let cache = FaultyCache::new(MemoryCache::new(10_000));
        let store = InMemoryProductStore::new();
        let retrying = RetryingCache::new(cache.clone(), fast_retry_policy(), &Clock::new_tokio());
        let service = InventoryService::new(retrying, store.clone(), ttls);
        Self {
            cache,
            store,
            state: AppState::new(service),
        }
    }

    #[must_use]
    pub fn service(&self) -> &TestService {
        self.state.inventory()
    }

    /// The HTTP application over this context.
    #[must_use]
    pub fn router(&self) -> Router {
        flash_sale_inventory::app(self.state.clone())
    }

    /// Raw cache value, bypassing fault injection.
    pub async fn cached(&self, key: CacheKey) -> Option<String> {
        self.cache.inner().get(&key.to_string()).await.unwrap()
    }

    /// Write a raw cache value, bypassing fault injection.
    pub async fn put_cached(&self, key: CacheKey, value: &str) {
        self.cache
            .inner()
            .set(&key.to_string(), value, Duration::from_secs(60))
            .await
            .unwrap();
    }

    /// Create a product through the service.
    pub async fn create(&self, name: &str, price: &str, inventory: i32) -> Product {
        self.service()
            .create_product(input(name, price, inventory))
            .await
            .unwrap()
    }
}

/// Product input with every required field set.
#[must_use]
pub fn input(name: &str, price: &str, inventory: i32) -> ProductInput {
    ProductInput {
        name: Some(name.to_string()),
        description: None,
        price: Some(price.parse::<Decimal>().unwrap()),
        inventory: Some(inventory),
    }
}

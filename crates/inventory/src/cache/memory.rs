//! In-process cache adapter backed by `moka`.
//!
//! Each entry carries its own absolute expiry, so per-key TTLs behave like
//! Redis `EX`: counters keep their original deadline when incremented or
//! decremented. Counter mutations go through `entry().and_compute_with`,
//! which moka serializes per key.
//!
//! The cache lives in this process only. Run a single instance when using it,
//! or the inventory counter is no longer shared between purchasers.

use std::collections::HashMap;
use std::future::ready;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::Op;

use super::{CacheResult, CacheStore, Decrement, parse_counter};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn new(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now() + ttl,
        }
    }

    /// Same deadline, new value.
    fn with_value(&self, value: u64) -> Self {
        Self {
            value: value.to_string(),
            expires_at: self.expires_at,
        }
    }

    // moka evicts lazily; never hand out a slot past its deadline.
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
    fn expire_after_create(&self, _key: &String, slot: &Slot, created_at: Instant) -> Option<Duration> {
        Some(slot.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        slot: &Slot,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(slot.expires_at.saturating_duration_since(updated_at))
    }
}

/// In-memory cache adapter.
///
/// Clones share the same underlying cache.
#[derive(Clone)]
pub struct MemoryCache {
    cache: Cache<String, Slot>,
}

impl MemoryCache {
    /// Create a cache holding at most `max_capacity` entries.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .name("flash-sale-inventory")
            .max_capacity(max_capacity)
            .expire_after(SlotExpiry)
            .build();

        tracing::info!(max_capacity, "In-memory cache initialized");

        Self { cache }
    }

    async fn live(&self, key: &str) -> Option<Slot> {
        self.cache.get(key).await.filter(Slot::is_live)
    }
}

impl CacheStore for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.live(key).await.map(|slot| slot.value))
    }

    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(slot) = self.live(key).await {
                found.insert(key.clone(), slot.value);
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.cache.insert(key.to_owned(), Slot::new(value, ttl)).await;
        Ok(())
    }

    async fn add(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut stored = false;
        self.cache
            .entry(key.to_owned())
            .and_compute_with(|existing| {
                let op = match existing {
                    Some(entry) if entry.value().is_live() => Op::Nop,
                    _ => {
                        stored = true;
                        Op::Put(Slot::new(value, ttl))
                    }
                };
                ready(op)
            })
            .await;
        Ok(stored)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .cache
            .remove(key)
            .await
            .is_some_and(|slot| slot.is_live()))
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        let mut outcome = Ok(None);
        self.cache
            .entry(key.to_owned())
            .and_compute_with(|existing| {
                let op = match existing {
                    Some(entry) if entry.value().is_live() => {
                        let slot = entry.value();
                        match parse_counter(key, &slot.value) {
                            Ok(current) => {
                                let next = current.saturating_add(delta);
                                outcome = Ok(Some(next));
                                Op::Put(slot.with_value(next))
                            }
                            Err(err) => {
                                outcome = Err(err);
                                Op::Nop
                            }
                        }
                    }
                    _ => Op::Nop,
                };
                ready(op)
            })
            .await;
        outcome
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<Option<Decrement>> {
        let mut outcome = Ok(None);
        self.cache
            .entry(key.to_owned())
            .and_compute_with(|existing| {
                let op = match existing {
                    Some(entry) if entry.value().is_live() => {
                        let slot = entry.value();
                        match parse_counter(key, &slot.value) {
                            Ok(current) if current >= delta => {
                                let next = current - delta;
                                outcome = Ok(Some(Decrement::Applied(next)));
                                Op::Put(slot.with_value(next))
                            }
                            Ok(current) => {
                                outcome = Ok(Some(Decrement::Exhausted));
                                if current == 0 {
                                    Op::Nop
                                } else {
                                    Op::Put(slot.with_value(0))
                                }
                            }
                            Err(err) => {
                                outcome = Err(err);
                                Op::Nop
                            }
                        }
                    }
                    _ => Op::Nop,
                };
                ready(op)
            })
            .await;
        outcome
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.cache.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::CacheError;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new(100);
        assert_eq!(cache.get("product:1").await.unwrap(), None);

        cache.set("product:1", "{}", TTL).await.unwrap();
        assert_eq!(cache.get("product:1").await.unwrap().as_deref(), Some("{}"));

        assert!(cache.delete("product:1").await.unwrap());
        assert!(!cache.delete("product:1").await.unwrap());
        assert_eq!(cache.get("product:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_multi_returns_present_keys_only() {
        let cache = MemoryCache::new(100);
        cache.set("product:1", "a", TTL).await.unwrap();
        cache.set("product:3", "c", TTL).await.unwrap();

        let keys = vec![
            "product:1".to_owned(),
            "product:2".to_owned(),
            "product:3".to_owned(),
        ];
        let found = cache.get_multi(&keys).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["product:1"], "a");
        assert_eq!(found["product:3"], "c");
        assert!(cache.get_multi(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_only_when_absent() {
        let cache = MemoryCache::new(100);
        assert!(cache.add("inventory:1", "25", TTL).await.unwrap());
        assert!(!cache.add("inventory:1", "99", TTL).await.unwrap());
        assert_eq!(cache.get("inventory:1").await.unwrap().as_deref(), Some("25"));
    }

    #[tokio::test]
    async fn test_increment_missing_key_is_none() {
        let cache = MemoryCache::new(100);
        assert_eq!(cache.increment("views:1", 1).await.unwrap(), None);
        assert_eq!(cache.get("views:1").await.unwrap(), None);

        cache.set("views:1", "1", TTL).await.unwrap();
        assert_eq!(cache.increment("views:1", 1).await.unwrap(), Some(2));
        assert_eq!(cache.increment("views:1", 5).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_decrement_clamps_and_reports_exhaustion() {
        let cache = MemoryCache::new(100);
        assert_eq!(cache.decrement("inventory:1", 1).await.unwrap(), None);

        cache.set("inventory:1", "2", TTL).await.unwrap();
        assert_eq!(
            cache.decrement("inventory:1", 1).await.unwrap(),
            Some(Decrement::Applied(1))
        );
        assert_eq!(
            cache.decrement("inventory:1", 5).await.unwrap(),
            Some(Decrement::Exhausted)
        );
        assert_eq!(cache.get("inventory:1").await.unwrap().as_deref(), Some("0"));
        assert_eq!(
            cache.decrement("inventory:1", 1).await.unwrap(),
            Some(Decrement::Exhausted)
        );
    }

    #[tokio::test]
    async fn test_counter_ops_reject_non_integers() {
        let cache = MemoryCache::new(100);
        cache.set("inventory:1", "lots", TTL).await.unwrap();
        assert!(matches!(
            cache.decrement("inventory:1", 1).await,
            Err(CacheError::InvalidValue { .. })
        ));
        assert!(matches!(
            cache.increment("inventory:1", 1).await,
            Err(CacheError::InvalidValue { .. })
        ));
        assert_eq!(cache.get("inventory:1").await.unwrap().as_deref(), Some("lots"));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCache::new(100);
        cache
            .set("views:1", "3", Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(cache.get("views:1").await.unwrap(), None);
        assert_eq!(cache.increment("views:1", 1).await.unwrap(), None);
        assert!(cache.add("views:1", "1", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_keeps_deadline() {
        let cache = MemoryCache::new(100);
        cache
            .set("views:1", "1", Duration::from_millis(80))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.increment("views:1", 1).await.unwrap(), Some(2));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get("views:1").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decrements_never_oversell() {
        let cache = Arc::new(MemoryCache::new(100));
        cache.set("inventory:1", "10", TTL).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.decrement("inventory:1", 1).await.unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), Some(Decrement::Applied(_))) {
                applied += 1;
            }
        }
        assert_eq!(applied, 10);
        assert_eq!(cache.get("inventory:1").await.unwrap().as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_flush_all() {
        let cache = MemoryCache::new(100);
        cache.set("product:1", "a", TTL).await.unwrap();
        cache.set("views:1", "1", TTL).await.unwrap();
        cache.flush_all().await.unwrap();
        assert_eq!(cache.get("product:1").await.unwrap(), None);
        assert_eq!(cache.get("views:1").await.unwrap(), None);
    }
}

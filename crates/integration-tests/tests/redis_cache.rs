//! Integration tests for the Redis cache adapter.
//!
//! These tests require a running Redis server (`REDIS_URL`, default
//! `redis://127.0.0.1:6379`). Keys are prefixed per process so parallel tests
//! do not collide; nothing here flushes the database.
//!
//! Run with: cargo test -p flash-sale-integration-tests --test redis_cache -- --ignored

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use redis::AsyncCommands;

use flash_sale_inventory::cache::{CacheError, CacheStore, Decrement, RedisCache};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn key(name: &str) -> String {
    format!("itest:{}:{name}", std::process::id())
}

async fn connect() -> RedisCache {
    RedisCache::connect(&redis_url())
        .await
        .expect("Failed to connect to Redis")
}

/// Remaining TTL in milliseconds, read with a separate raw connection.
async fn pttl(key: &str) -> i64 {
    let client = redis::Client::open(redis_url()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    conn.pttl(key).await.unwrap()
}

// ============================================================================
// Plain values
// ============================================================================

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_set_get_delete() {
    let cache = connect().await;
    let k = key("plain");

    cache.set(&k, "{\"id\":1}", Duration::from_secs(60)).await.unwrap();
    assert_eq!(cache.get(&k).await.unwrap().as_deref(), Some("{\"id\":1}"));
    assert!(pttl(&k).await > 0);

    assert!(cache.delete(&k).await.unwrap());
    assert!(!cache.delete(&k).await.unwrap());
    assert!(cache.get(&k).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_add_only_when_absent() {
    let cache = connect().await;
    let k = key("add");
    cache.delete(&k).await.unwrap();

    assert!(cache.add(&k, "10", Duration::from_secs(60)).await.unwrap());
    assert!(!cache.add(&k, "99", Duration::from_secs(60)).await.unwrap());
    assert_eq!(cache.get(&k).await.unwrap().as_deref(), Some("10"));

    let ttl = pttl(&k).await;
    assert!(ttl > 0 && ttl <= 60_000, "unexpected ttl {ttl}");
}

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_get_multi_skips_missing_keys() {
    let cache = connect().await;
    let (a, b, c) = (key("multi:a"), key("multi:b"), key("multi:c"));
    cache.delete(&b).await.unwrap();
    cache.set(&a, "A", Duration::from_secs(60)).await.unwrap();
    cache.set(&c, "C", Duration::from_secs(60)).await.unwrap();

    let found = cache.get_multi(&[a.clone(), b.clone(), c.clone()]).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found.get(&a).map(String::as_str), Some("A"));
    assert_eq!(found.get(&c).map(String::as_str), Some("C"));
    assert!(!found.contains_key(&b));

    assert!(cache.get_multi(&[]).await.unwrap().is_empty());
}

// ============================================================================
// Counters
// ============================================================================

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_increment_missing_key_is_none() {
    let cache = connect().await;
    let k = key("incr:missing");
    cache.delete(&k).await.unwrap();

    assert_eq!(cache.increment(&k, 1).await.unwrap(), None);
    // the script must not create the key
    assert!(cache.get(&k).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_increment_keeps_ttl() {
    let cache = connect().await;
    let k = key("incr:ttl");
    cache.delete(&k).await.unwrap();
    cache.add(&k, "1", Duration::from_secs(60)).await.unwrap();

    assert_eq!(cache.increment(&k, 2).await.unwrap(), Some(3));
    let ttl = pttl(&k).await;
    assert!(ttl > 0 && ttl <= 60_000, "increment dropped the ttl: {ttl}");
}

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_decrement_clamps_at_zero_and_keeps_ttl() {
    let cache = connect().await;
    let k = key("decr:clamp");
    cache.set(&k, "2", Duration::from_secs(60)).await.unwrap();

    assert_eq!(cache.decrement(&k, 1).await.unwrap(), Some(Decrement::Applied(1)));
    assert_eq!(cache.decrement(&k, 5).await.unwrap(), Some(Decrement::Exhausted));
    assert_eq!(cache.get(&k).await.unwrap().as_deref(), Some("0"));
    assert_eq!(cache.decrement(&k, 1).await.unwrap(), Some(Decrement::Exhausted));
    assert_eq!(cache.get(&k).await.unwrap().as_deref(), Some("0"));

    let ttl = pttl(&k).await;
    assert!(ttl > 0, "clamp dropped the ttl: {ttl}");
}

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_decrement_missing_key_is_none() {
    let cache = connect().await;
    let k = key("decr:missing");
    cache.delete(&k).await.unwrap();

    assert_eq!(cache.decrement(&k, 1).await.unwrap(), None);
    assert!(cache.get(&k).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_non_integer_counter_is_rejected() {
    let cache = connect().await;
    let k = key("decr:banana");
    cache.set(&k, "banana", Duration::from_secs(60)).await.unwrap();

    assert!(matches!(cache.decrement(&k, 1).await, Err(CacheError::Command(_))));
    assert!(matches!(cache.increment(&k, 1).await, Err(CacheError::Command(_))));
    assert_eq!(cache.get(&k).await.unwrap().as_deref(), Some("banana"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "Requires running Redis"]
async fn test_concurrent_decrements_never_go_below_zero() {
    const STOCK: usize = 10;
    const BUYERS: usize = 100;

    let cache = Arc::new(connect().await);
    let k = key("decr:race");
    cache.set(&k, &STOCK.to_string(), Duration::from_secs(60)).await.unwrap();

    let mut handles = Vec::with_capacity(BUYERS);
    for _ in 0..BUYERS {
        let cache = Arc::clone(&cache);
        let k = k.clone();
        handles.push(tokio::spawn(async move { cache.decrement(&k, 1).await }));
    }

    let mut applied = Vec::new();
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Some(Decrement::Applied(left)) => applied.push(left),
            Some(Decrement::Exhausted) => exhausted += 1,
            None => panic!("counter vanished mid-sale"),
        }
    }

    assert_eq!(applied.len(), STOCK);
    assert_eq!(exhausted, BUYERS - STOCK);
    // every remaining count was handed out exactly once
    applied.sort_unstable();
    assert_eq!(applied, (0..10).collect::<Vec<u64>>());
    assert_eq!(cache.get(&k).await.unwrap().as_deref(), Some("0"));
}

//! Cache client: the fast path in front of the product store.
//!
//! # Architecture
//!
//! - [`CacheStore`] is a small, string-based interface (values are JSON or
//!   decimal integers) so that any key/value server with TTLs and atomic
//!   counters can back it.
//! - [`RedisCache`] is the production adapter (shared across processes).
//! - [`MemoryCache`] is an in-process `moka` adapter for single-node and local
//!   development use.
//! - [`RetryingCache`] wraps either one in a `seatbelt` pipeline: bounded
//!   retries with backoff over a per-attempt timeout.
//!
//! Cache failures are reported as [`CacheError`] values and never panic; the
//! caller decides whether a failure is fatal.

mod memory;
mod redis_cache;
mod retry;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;
pub use retry::{RetryPolicy, RetryingCache};

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors.
///
/// Kept independent from the service error type so callers can choose to
/// fail open (reads) or fail closed (purchase decrement).
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The cache server could not be reached or the connection dropped.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// No reply arrived. The command may or may not have been applied.
    #[error("cache operation timed out: {0}")]
    Timeout(String),

    /// The server rejected the command.
    #[error("cache command failed: {0}")]
    Command(String),

    /// A counter operation found a value that is not an unsigned integer.
    #[error("invalid cached value for {key}: {reason}")]
    InvalidValue {
        /// Key holding the bad value.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl CacheError {
    /// Whether a retry might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Outcome of an atomic decrement on an existing counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// The counter held at least `delta`; this is its new value.
    Applied(u64),
    /// The counter held less than `delta`. It is now clamped at zero and no
    /// units were taken.
    Exhausted,
}

/// A key/value cache with per-key TTL, atomic counters and batched reads.
///
/// Implementations must be safe for concurrent use by many in-flight requests.
/// `increment` and `decrement` must be atomic at the cache server: concurrent
/// calls on one key are linearized and never lose updates.
pub trait CacheStore: Send + Sync + 'static {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Get a value.
    fn get(&self, key: &str) -> impl Future<Output = CacheResult<Option<String>>> + Send;

    /// Get many values in one round trip. Absent keys are left out of the map.
    fn get_multi(
        &self,
        keys: &[String],
    ) -> impl Future<Output = CacheResult<HashMap<String, String>>> + Send;

    /// Store a value, replacing any existing one, expiring after `ttl`.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// Store a value only if the key is absent.
    ///
    /// Returns `true` if this call stored the value, `false` if the key
    /// already existed.
    fn add(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = CacheResult<bool>> + Send;

    /// Remove a key. Returns `true` if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = CacheResult<bool>> + Send;

    /// Atomically add `delta` to an integer value, keeping its TTL.
    ///
    /// Returns `None` if the key does not exist.
    fn increment(
        &self,
        key: &str,
        delta: u64,
    ) -> impl Future<Output = CacheResult<Option<u64>>> + Send;

    /// Atomically subtract `delta` from an integer value, keeping its TTL.
    ///
    /// Never takes the value below zero. Returns `None` if the key does not exist.
    fn decrement(
        &self,
        key: &str,
        delta: u64,
    ) -> impl Future<Output = CacheResult<Option<Decrement>>> + Send;

    /// Drop every entry.
    fn flush_all(&self) -> impl Future<Output = CacheResult<()>> + Send;
}

/// Parse a counter value, reporting the key on failure.
pub(crate) fn parse_counter(key: &str, raw: &str) -> CacheResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| CacheError::InvalidValue {
            key: key.to_owned(),
            reason: format!("{raw:?} is not a counter: {e}"),
        })
}

/// The cache backend selected at startup.
#[derive(Clone)]
pub enum CacheBackend {
    Redis(RedisCache),
    Memory(MemoryCache),
}

impl CacheStore for CacheBackend {
    fn backend_name(&self) -> &'static str {
        match self {
            Self::Redis(cache) => cache.backend_name(),
            Self::Memory(cache) => cache.backend_name(),
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            Self::Redis(cache) => cache.get(key).await,
            Self::Memory(cache) => cache.get(key).await,
        }
    }

    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        match self {
            Self::Redis(cache) => cache.get_multi(keys).await,
            Self::Memory(cache) => cache.get_multi(keys).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            Self::Redis(cache) => cache.set(key, value, ttl).await,
            Self::Memory(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn add(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        match self {
            Self::Redis(cache) => cache.add(key, value, ttl).await,
            Self::Memory(cache) => cache.add(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        match self {
            Self::Redis(cache) => cache.delete(key).await,
            Self::Memory(cache) => cache.delete(key).await,
        }
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        match self {
            Self::Redis(cache) => cache.increment(key, delta).await,
            Self::Memory(cache) => cache.increment(key, delta).await,
        }
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<Option<Decrement>> {
        match self {
            Self::Redis(cache) => cache.decrement(key, delta).await,
            Self::Memory(cache) => cache.decrement(key, delta).await,
        }
    }

    async fn flush_all(&self) -> CacheResult<()> {
        match self {
            Self::Redis(cache) => cache.flush_all().await,
            Self::Memory(cache) => cache.flush_all().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counter() {
        assert_eq!(parse_counter("k", "42").ok(), Some(42));
        assert_eq!(parse_counter("k", " 7\r\n").ok(), Some(7));
        assert!(matches!(
            parse_counter("inventory:1", "-1"),
            Err(CacheError::InvalidValue { key, .. }) if key == "inventory:1"
        ));
        assert!(parse_counter("k", "{\"id\":1}").is_err());
    }

    #[test]
    fn test_transient_classification() {
        assert!(CacheError::Unavailable("refused".into()).is_transient());
        assert!(CacheError::Timeout("no reply within 5ms".into()).is_transient());
        assert!(!CacheError::Command("WRONGTYPE".into()).is_transient());
        assert!(
            !CacheError::InvalidValue {
                key: "k".into(),
                reason: "x".into()
            }
            .is_transient()
        );
    }
}

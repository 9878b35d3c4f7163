//! Bounded retries with backoff for cache operations.
//!
//! [`RetryingCache`] wraps any [`CacheStore`] and runs every call through a
//! `seatbelt` pipeline: a retry layer with exponential, jittered backoff on
//! top of a per-attempt timeout layer.
//!
//! Reads, `set`, `delete` and `flush_all` are safe to replay and retry on any
//! transient error. `add`, `increment` and `decrement` retry only when the
//! server was never reached (`CacheError::Unavailable`): after a timeout the
//! write may already have been applied.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use layered::{Execute, Service, Stack};
use seatbelt::retry::{OnRetryArgs, RecoveryArgs, Retry};
use seatbelt::timeout::{Timeout, TimeoutOutputArgs};
use seatbelt::{RecoveryInfo, ResilienceContext};
use tick::Clock;
use tracing::warn;

use super::{CacheError, CacheResult, CacheStore, Decrement};

/// Retry and timeout settings for cache calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Backoff before the first retry. Doubles on every retry after that.
    pub initial_delay: Duration,
    /// Upper bound for any single backoff.
    pub max_delay: Duration,
    /// Limit for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

/// Which failures a call may be retried after.
#[derive(Debug, Clone, Copy)]
enum Replay {
    /// Safe to repeat: retry on any transient error.
    Idempotent,
    /// Not safe to repeat once the server may have seen it.
    Mutation,
}

impl Replay {
    const fn allows(self, err: &CacheError) -> bool {
        match self {
            Self::Idempotent => err.is_transient(),
            Self::Mutation => matches!(err, CacheError::Unavailable(_)),
        }
    }

    fn recovery<T>(self, output: &CacheResult<T>) -> RecoveryInfo {
        match output {
            Err(err) if self.allows(err) => RecoveryInfo::retry(),
            _ => RecoveryInfo::never(),
        }
    }
}

/// A [`CacheStore`] decorator adding timeouts and retries.
pub struct RetryingCache<C> {
    inner: Arc<C>,
    policy: RetryPolicy,
    clock: Clock,
}

impl<C> Clone for RetryingCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy,
            clock: self.clock.clone(),
        }
    }
}

impl<C: CacheStore> RetryingCache<C> {
    /// Wrap `inner`. Backoff delays and attempt timeouts run on `clock`.
    #[must_use]
    pub fn new(inner: C, policy: RetryPolicy, clock: &Clock) -> Self {
        Self {
            inner: Arc::new(inner),
            policy,
            clock: clock.clone(),
        }
    }

    /// The wrapped cache.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        key: &str,
        replay: Replay,
        call: F,
    ) -> CacheResult<T>
    where
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let context = ResilienceContext::<Arc<C>, CacheResult<T>>::new(&self.clock).name("cache");
        let backend = self.inner.backend_name();
        let label = key.to_owned();

        let stack = (
            Retry::layer(operation, &context)
                .clone_input()
                .max_retry_attempts(self.policy.max_retries)
                .base_delay(self.policy.initial_delay)
                .max_delay(self.policy.max_delay)
                .recovery_with(move |output: &CacheResult<T>, _args: RecoveryArgs| {
                    replay.recovery(output)
                })
                .on_retry(move |output: &CacheResult<T>, args: OnRetryArgs| {
                    if let Err(err) = output {
                        warn!(
                            backend,
                            operation,
                            key = %label,
                            attempt = args.attempt().index() + 1,
                            delay_ms = u64::try_from(args.retry_delay().as_millis()).unwrap_or(u64::MAX),
                            error = %err,
                            "Cache call failed, retrying"
                        );
                    }
                }),
            Timeout::layer(operation, &context)
                .timeout(self.policy.attempt_timeout)
                .timeout_error(|args: TimeoutOutputArgs| {
                    CacheError::Timeout(format!("no reply within {:?}", args.timeout()))
                }),
            Execute::new(call),
        );

        stack.into_service().execute(Arc::clone(&self.inner)).await
    }
}

impl<C: CacheStore> CacheStore for RetryingCache<C> {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let owned = key.to_owned();
        self.run("get", key, Replay::Idempotent, move |cache: Arc<C>| {
            let key = owned.clone();
            async move { cache.get(&key).await }
        })
        .await
    }

    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        let label = keys.first().map_or("", String::as_str);
        let owned = keys.to_vec();
        self.run("get_multi", label, Replay::Idempotent, move |cache: Arc<C>| {
            let keys = owned.clone();
            async move { cache.get_multi(&keys).await }
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let (owned_key, owned_value) = (key.to_owned(), value.to_owned());
        self.run("set", key, Replay::Idempotent, move |cache: Arc<C>| {
            let (key, value) = (owned_key.clone(), owned_value.clone());
            async move { cache.set(&key, &value, ttl).await }
        })
        .await
    }

    async fn add(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        // A replay after a lost reply would report `false` for our own write.
        let (owned_key, owned_value) = (key.to_owned(), value.to_owned());
        self.run("add", key, Replay::Mutation, move |cache: Arc<C>| {
            let (key, value) = (owned_key.clone(), owned_value.clone());
            async move { cache.add(&key, &value, ttl).await }
        })
        .await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let owned = key.to_owned();
        self.run("delete", key, Replay::Idempotent, move |cache: Arc<C>| {
            let key = owned.clone();
            async move { cache.delete(&key).await }
        })
        .await
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        let owned = key.to_owned();
        self.run("increment", key, Replay::Mutation, move |cache: Arc<C>| {
            let key = owned.clone();
            async move { cache.increment(&key, delta).await }
        })
        .await
    }

    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<Option<Decrement>> {
        let owned = key.to_owned();
        self.run("decrement", key, Replay::Mutation, move |cache: Arc<C>| {
            let key = owned.clone();
            async move { cache.decrement(&key, delta).await }
        })
        .await
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.run("flush_all", "*", Replay::Idempotent, |cache: Arc<C>| async move {
            cache.flush_all().await
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;
    use crate::cache::MemoryCache;

    /// Fails the first `failures` calls of every operation with `error`.
    #[derive(Clone)]
    struct Flaky {
        inner: MemoryCache,
        calls: Arc<AtomicU32>,
        failures: u32,
        error: CacheError,
        stall: bool,
    }

    impl Flaky {
        fn new(failures: u32, error: CacheError) -> Self {
            Self {
                inner: MemoryCache::new(100),
                calls: Arc::new(AtomicU32::new(0)),
                failures,
                error,
                stall: false,
            }
        }

        fn stalling() -> Self {
            Self {
                stall: true,
                ..Self::new(u32::MAX, CacheError::Command("unused".into()))
            }
        }

        async fn gate(&self) -> CacheResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(())
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CacheStore for Flaky {
        fn backend_name(&self) -> &'static str {
            "flaky"
        }

        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            self.gate().await?;
            self.inner.get(key).await
        }

        async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
            self.gate().await?;
            self.inner.get_multi(keys).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
            self.gate().await?;
            self.inner.set(key, value, ttl).await
        }

        async fn add(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
            self.gate().await?;
            self.inner.add(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> CacheResult<bool> {
            self.gate().await?;
            self.inner.delete(key).await
        }

        async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
            self.gate().await?;
            self.inner.increment(key, delta).await
        }

        async fn decrement(&self, key: &str, delta: u64) -> CacheResult<Option<Decrement>> {
            self.gate().await?;
            self.inner.decrement(key, delta).await
        }

        async fn flush_all(&self) -> CacheResult<()> {
            self.gate().await?;
            self.inner.flush_all().await
        }
    }

    /// Applies the first `add`, then loses its reply.
    #[derive(Clone)]
    struct LostAddReply {
        inner: MemoryCache,
        adds: Arc<AtomicU32>,
        lost: Arc<AtomicBool>,
    }

    impl LostAddReply {
        fn new() -> Self {
            Self {
                inner: MemoryCache::new(100),
                adds: Arc::new(AtomicU32::new(0)),
                lost: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl CacheStore for LostAddReply {
        fn backend_name(&self) -> &'static str {
            "lost-reply"
        }

        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
            self.inner.get_multi(keys).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
            self.inner.set(key, value, ttl).await
        }

        async fn add(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
            self.adds.fetch_add(1, Ordering::SeqCst);
            let added = self.inner.add(key, value, ttl).await?;
            if !self.lost.swap(true, Ordering::SeqCst) {
                return Err(CacheError::Timeout("reply lost".into()));
            }
            Ok(added)
        }

        async fn delete(&self, key: &str) -> CacheResult<bool> {
            self.inner.delete(key).await
        }

        async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
            self.inner.increment(key, delta).await
        }

        async fn decrement(&self, key: &str, delta: u64) -> CacheResult<Option<Decrement>> {
            self.inner.decrement(key, delta).await
        }

        async fn flush_all(&self) -> CacheResult<()> {
            self.inner.flush_all().await
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_delays(Duration::from_millis(1), Duration::from_millis(2))
            .with_attempt_timeout(Duration::from_millis(50))
    }

    fn retrying<C: CacheStore>(inner: C, policy: RetryPolicy) -> RetryingCache<C> {
        RetryingCache::new(inner, policy, &Clock::new_tokio())
    }

    #[test]
    fn test_replay_classification() {
        let refused = CacheError::Unavailable("refused".into());
        let timed_out = CacheError::Timeout("slow".into());
        let rejected = CacheError::Command("WRONGTYPE".into());

        assert!(Replay::Idempotent.allows(&refused));
        assert!(Replay::Idempotent.allows(&timed_out));
        assert!(!Replay::Idempotent.allows(&rejected));
        assert!(Replay::Mutation.allows(&refused));
        assert!(!Replay::Mutation.allows(&timed_out));
        assert!(!Replay::Mutation.allows(&rejected));
    }

    #[tokio::test]
    async fn test_transient_read_errors_are_retried() {
        let flaky = Flaky::new(2, CacheError::Unavailable("refused".into()));
        let cache = retrying(flaky.clone(), fast_policy(3));

        cache.inner().inner.set("product:1", "{}", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("product:1").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let flaky = Flaky::new(u32::MAX, CacheError::Unavailable("refused".into()));
        let cache = retrying(flaky.clone(), fast_policy(2));

        assert!(matches!(
            cache.get("product:1").await,
            Err(CacheError::Unavailable(_))
        ));
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_retries_makes_one_attempt() {
        let flaky = Flaky::new(u32::MAX, CacheError::Unavailable("refused".into()));
        let cache = retrying(flaky.clone(), RetryPolicy::no_retries());

        assert!(cache.set("k", "v", Duration::from_secs(1)).await.is_err());
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn test_command_errors_are_not_retried() {
        let flaky = Flaky::new(1, CacheError::Command("WRONGTYPE".into()));
        let cache = retrying(flaky.clone(), fast_policy(3));

        assert!(matches!(cache.delete("k").await, Err(CacheError::Command(_))));
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn test_decrement_not_replayed_after_timeout() {
        let flaky = Flaky::new(1, CacheError::Timeout("no reply".into()));
        let cache = retrying(flaky.clone(), fast_policy(3));

        assert!(matches!(
            cache.decrement("inventory:1", 1).await,
            Err(CacheError::Timeout(_))
        ));
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn test_decrement_retried_when_unreachable() {
        let flaky = Flaky::new(1, CacheError::Unavailable("refused".into()));
        let cache = retrying(flaky.clone(), fast_policy(3));
        cache
            .inner()
            .inner
            .set("inventory:1", "3", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.decrement("inventory:1", 1).await.unwrap(),
            Some(Decrement::Applied(2))
        );
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn test_add_not_replayed_after_lost_reply() {
        let lossy = LostAddReply::new();
        let cache = retrying(lossy.clone(), fast_policy(3));

        assert!(matches!(
            cache.add("views:1", "1", Duration::from_secs(60)).await,
            Err(CacheError::Timeout(_))
        ));
        assert_eq!(lossy.adds.load(Ordering::SeqCst), 1);
        // the write landed even though the caller saw an error
        assert_eq!(lossy.inner.get("views:1").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_add_retried_when_unreachable() {
        let flaky = Flaky::new(1, CacheError::Unavailable("refused".into()));
        let cache = retrying(flaky.clone(), fast_policy(3));

        assert!(cache.add("views:1", "1", Duration::from_secs(60)).await.unwrap());
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn test_slow_attempts_time_out() {
        let flaky = Flaky::stalling();
        let cache = retrying(flaky.clone(), fast_policy(1));

        assert!(matches!(
            cache.get("product:1").await,
            Err(CacheError::Timeout(_))
        ));
        assert_eq!(flaky.calls(), 2);
    }
}

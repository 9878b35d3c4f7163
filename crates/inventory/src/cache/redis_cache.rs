//! Redis-backed cache adapter.
//!
//! # Key Layout
//!
//! Keys are used as given (`product:{id}`, `inventory:{id}`, `views:{id}`);
//! namespacing is the service's job. Values are UTF-8 strings: product JSON or
//! decimal integers.
//!
//! # Atomicity
//!
//! - `add` is `SET key value NX EX ttl` (one command).
//! - `increment` and `decrement` run as Lua scripts so the existence check,
//!   the arithmetic and the clamp execute as one server-side step. Plain
//!   `INCRBY`/`DECRBY` would create missing keys and let counters go negative.
//!
//! # Connections
//!
//! Uses `ConnectionManager`, which multiplexes one connection and reconnects
//! on failure. Clones share it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use tracing::instrument;

use super::{CacheError, CacheResult, CacheStore, Decrement};

/// Add to an integer only if the key exists. Returns nil for a missing key.
const INCREMENT_EXISTING_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
return redis.call('INCRBY', KEYS[1], ARGV[1])
";

/// Subtract from an integer only if it holds enough, clamping at zero.
///
/// Returns nil for a missing key, `{1, new_value}` when applied and `{0, 0}`
/// when exhausted.
const DECREMENT_CLAMPED_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
    return false
end
local value = tonumber(current)
local delta = tonumber(ARGV[1])
if value == nil then
    return redis.error_reply('ERR value is not an integer')
end
if value >= delta then
    return {1, redis.call('DECRBY', KEYS[1], delta)}
end
if value ~= 0 then
    redis.call('SET', KEYS[1], 0, 'KEEPTTL')
end
return {0, 0}
";

/// Redis cache adapter.
#[derive(Clone)]
pub struct RedisCache {
    inner: Arc<RedisCacheInner>,
}

struct RedisCacheInner {
    conn_manager: ConnectionManager,
    increment_script: Script,
    decrement_script: Script,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - e.g. `redis://127.0.0.1:6379` or `redis://:password@host:6379/0`
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if the URL is malformed or the
    /// initial connection fails.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Unavailable(format!("invalid Redis URL: {e}")))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Unavailable(format!("failed to connect to Redis: {e}")))?;

        tracing::info!("Redis cache connected");

        Ok(Self {
            inner: Arc::new(RedisCacheInner {
                conn_manager,
                increment_script: Script::new(INCREMENT_EXISTING_SCRIPT),
                decrement_script: Script::new(DECREMENT_CLAMPED_SCRIPT),
            }),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.inner.conn_manager.clone()
    }
}

/// Redis TTLs are whole seconds and must be at least one.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn map_redis_error(err: RedisError) -> CacheError {
    // A dropped connection may have carried the command to the server.
    if err.is_timeout() || err.is_connection_dropped() {
        CacheError::Timeout(err.to_string())
    } else if err.is_connection_refusal() || err.is_io_error() {
        CacheError::Unavailable(err.to_string())
    } else {
        CacheError::Command(err.to_string())
    }
}

fn to_u64(key: &str, value: i64) -> CacheResult<u64> {
    u64::try_from(value).map_err(|_| CacheError::InvalidValue {
        key: key.to_owned(),
        reason: format!("counter is negative ({value})"),
    })
}

impl CacheStore for RedisCache {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self), level = "trace")]
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(map_redis_error)
    }

    #[instrument(skip(self, keys), fields(count = keys.len()), level = "trace")]
    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        // MGET with no keys is a syntax error
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.conn();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect())
    }

    #[instrument(skip(self, value), level = "trace")]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn();
        conn.set_ex(key, value, ttl_seconds(ttl))
            .await
            .map_err(map_redis_error)
    }

    #[instrument(skip(self, value), level = "trace")]
    async fn add(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(reply.is_some())
    }

    #[instrument(skip(self), level = "trace")]
    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn();
        let removed: u64 = conn.del(key).await.map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    #[instrument(skip(self), level = "trace")]
    async fn increment(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        let mut conn = self.conn();
        let value: Option<i64> = self
            .inner
            .increment_script
            .key(key)
            .arg(delta)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        value.map(|v| to_u64(key, v)).transpose()
    }

    #[instrument(skip(self), level = "trace")]
    async fn decrement(&self, key: &str, delta: u64) -> CacheResult<Option<Decrement>> {
        let mut conn = self.conn();
        let reply: Option<(i64, i64)> = self
            .inner
            .decrement_script
            .key(key)
            .arg(delta)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        match reply {
            None => Ok(None),
            Some((1, remaining)) => Ok(Some(Decrement::Applied(to_u64(key, remaining)?))),
            Some(_) => Ok(Some(Decrement::Exhausted)),
        }
    }

    async fn flush_all(&self) -> CacheResult<()> {
        let mut conn = self.conn();
        redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)
    }
}

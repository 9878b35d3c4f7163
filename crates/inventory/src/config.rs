//! Inventory service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `INVENTORY_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `INVENTORY_DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `INVENTORY_HOST` - Bind address (default: 127.0.0.1)
//! - `INVENTORY_PORT` - Listen port (default: 3000)
//! - `CACHE_BACKEND` - `redis` or `memory` (default: redis)
//! - `CACHE_URL` - Redis URL (default: built from `CACHE_HOST` and `CACHE_PORT`)
//! - `CACHE_HOST` - Redis host (default: localhost)
//! - `CACHE_PORT` - Redis port (default: 6379)
//! - `CACHE_MAX_CAPACITY` - Entry cap for the memory backend (default: 100000)
//! - `PRODUCT_CACHE_TTL_SECS` - Product entry TTL (default: 120)
//! - `INVENTORY_CACHE_TTL_SECS` - Inventory counter TTL (default: 120)
//! - `VIEWS_CACHE_TTL_SECS` - View counter TTL (default: 120)
//! - `CACHE_MAX_RETRIES` - Retries after the first attempt (default: 3)
//! - `CACHE_RETRY_DELAY_MS` - Initial retry backoff (default: 50)
//! - `CACHE_RETRY_MAX_DELAY_MS` - Backoff cap (default: 1000)
//! - `CACHE_OP_TIMEOUT_MS` - Per-attempt timeout (default: 500)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::cache::RetryPolicy;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Inventory service configuration.
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Maximum pooled database connections
    pub database_max_connections: u32,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Cache backend and tuning
    pub cache: CacheConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. production, staging)
    pub sentry_environment: Option<String>,
}

/// Which cache adapter to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// Shared Redis server.
    Redis,
    /// In-process `moka` cache. Single instance only.
    Memory,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected 'redis' or 'memory', got '{other}'")),
        }
    }
}

/// Time-to-live for each cache key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub product: Duration,
    pub inventory: Duration,
    pub views: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        let two_minutes = Duration::from_secs(DEFAULT_TTL_SECS);
        Self {
            product: two_minutes,
            inventory: two_minutes,
            views: two_minutes,
        }
    }
}

/// Cache configuration.
///
/// Implements `Debug` manually to redact the Redis URL.
#[derive(Clone)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// Redis connection URL (may contain a password)
    pub url: SecretString,
    /// Entry cap for the memory backend
    pub max_capacity: u64,
    pub ttls: CacheTtls,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("backend", &self.backend)
            .field("url", &"[REDACTED]")
            .field("max_capacity", &self.max_capacity)
            .field("ttls", &self.ttls)
            .field("retry", &self.retry)
            .finish()
    }
}

const DEFAULT_TTL_SECS: u64 = 120;

impl InventoryConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let database_url = env.database_url("INVENTORY_DATABASE_URL")?;
        let database_max_connections = env.parse_or("INVENTORY_DATABASE_MAX_CONNECTIONS", 10)?;
        let host = env.parse_or("INVENTORY_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = env.parse_or("INVENTORY_PORT", 3000)?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            cache: CacheConfig::from_env(&env)?,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl CacheConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let backend = env.parse_or("CACHE_BACKEND", CacheBackendKind::Redis)?;
        let url = env.optional("CACHE_URL").unwrap_or_else(|| {
            let host = env.or_default("CACHE_HOST", "localhost");
            let port = env.or_default("CACHE_PORT", "6379");
            format!("redis://{host}:{port}")
        });

        let ttls = CacheTtls {
            product: env.ttl("PRODUCT_CACHE_TTL_SECS")?,
            inventory: env.ttl("INVENTORY_CACHE_TTL_SECS")?,
            views: env.ttl("VIEWS_CACHE_TTL_SECS")?,
        };

        let defaults = RetryPolicy::default();
        let initial_delay = Duration::from_millis(env.parse_or(
            "CACHE_RETRY_DELAY_MS",
            millis(defaults.initial_delay),
        )?);
        let max_delay = Duration::from_millis(env.parse_or(
            "CACHE_RETRY_MAX_DELAY_MS",
            millis(defaults.max_delay),
        )?);
        if max_delay < initial_delay {
            return Err(ConfigError::InvalidEnvVar(
                "CACHE_RETRY_MAX_DELAY_MS".to_string(),
                "must not be below CACHE_RETRY_DELAY_MS".to_string(),
            ));
        }
        let attempt_timeout: u64 =
            env.parse_or("CACHE_OP_TIMEOUT_MS", millis(defaults.attempt_timeout))?;
        if attempt_timeout == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CACHE_OP_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let retry = defaults
            .with_max_retries(env.parse_or("CACHE_MAX_RETRIES", defaults.max_retries)?)
            .with_delays(initial_delay, max_delay)
            .with_attempt_timeout(Duration::from_millis(attempt_timeout));

        Ok(Self {
            backend,
            url: SecretString::from(url),
            max_capacity: env.parse_or("CACHE_MAX_CAPACITY", 100_000)?,
            ttls,
            retry,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Variable lookup with the parsing helpers used above.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional variable. Empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, using `default` when it is unset.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    /// A TTL in whole seconds. Zero would mean "never cached", so it is rejected.
    fn ttl(&self, key: &str) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parse_or(key, DEFAULT_TTL_SECS)?;
        if secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(Duration::from_secs(secs))
    }

    /// Get database URL with fallback to generic `DATABASE_URL`.
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        self.optional(primary_key)
            .or_else(|| self.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }
}

//! Flash sale inventory service library.
//!
//! Serves product reads from a cache in front of `PostgreSQL` and sells
//! inventory through an atomic cache decrement, so concurrent buyers can never
//! take more units than exist.
//!
//! This crate provides the service as a library, allowing it to be tested and
//! reused by the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use secrecy::ExposeSecret;
use tick::Clock;
use tower_http::trace::TraceLayer;

use cache::{CacheBackend, CacheError, CacheStore, MemoryCache, RedisCache, RetryingCache};
use config::{CacheBackendKind, CacheConfig};
use db::ProductStore;
use state::AppState;

/// The cache stack used in production: the configured backend behind retries.
pub type AppCache = RetryingCache<CacheBackend>;

/// Construct the configured cache backend wrapped in the retry decorator.
///
/// # Errors
///
/// Returns `CacheError::Unavailable` if the Redis backend cannot connect.
pub async fn connect_cache(config: &CacheConfig) -> Result<AppCache, CacheError> {
    let backend = match config.backend {
        CacheBackendKind::Redis => {
            CacheBackend::Redis(RedisCache::connect(config.url.expose_secret()).await?)
        }
        CacheBackendKind::Memory => {
            tracing::warn!("Using in-process cache; run a single instance only");
            CacheBackend::Memory(MemoryCache::new(config.max_capacity))
        }
    };

    Ok(RetryingCache::new(backend, config.retry, &Clock::new_tokio()))
}

/// Build the HTTP application: routes, request tracing and Sentry layers.
pub fn app<C: CacheStore, S: ProductStore>(state: AppState<C, S>) -> Router {
    routes::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

//! HTTP route handlers for the inventory service.
//!
//! # Route Structure
//!
//! ```text
//! GET    /                          - Banner
//! GET    /health                    - Liveness check
//! GET    /health/ready              - Readiness check (store reachable)
//!
//! # Products
//! GET    /products                  - List every product
//! POST   /products                  - Create a product
//! GET    /products/{id}             - Show one product (with cache/store source)
//! PUT    /products/{id}             - Overwrite a product
//! DELETE /products/{id}             - Delete a product
//! POST   /products/{id}/purchase    - Buy one unit
//! GET    /products/{id}/views       - Count a view
//!
//! # Cache
//! GET    /cache/flush               - Drop every cache entry
//! ```

pub mod cache;
pub mod products;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::cache::CacheStore;
use crate::db::ProductStore;
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes<C: CacheStore, S: ProductStore>() -> Router<AppState<C, S>> {
    Router::new()
        .route("/", get(products::index::<C, S>).post(products::create::<C, S>))
        .route(
            "/{id}",
            get(products::show::<C, S>)
                .put(products::update::<C, S>)
                .delete(products::destroy::<C, S>),
        )
        .route("/{id}/purchase", post(products::purchase::<C, S>))
        .route("/{id}/views", get(products::views::<C, S>))
}

/// Create the cache routes router.
pub fn cache_routes<C: CacheStore, S: ProductStore>() -> Router<AppState<C, S>> {
    Router::new().route("/flush", get(cache::flush::<C, S>))
}

/// Create all routes for the inventory service.
pub fn routes<C: CacheStore, S: ProductStore>() -> Router<AppState<C, S>> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/health/ready", get(readiness::<C, S>))
        .nest("/products", product_routes())
        .nest("/cache", cache_routes())
}

async fn banner() -> &'static str {
    "Flash Sale Inventory API is running!"
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness<C: CacheStore, S: ProductStore>(State(state): State<AppState<C, S>>) -> StatusCode {
    match state.inventory().ping_store().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

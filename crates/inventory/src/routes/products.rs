//! Product route handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Serialize;

use flash_sale_core::{Product, ProductId, ProductInput, Source};

use crate::cache::CacheStore;
use crate::db::ProductStore;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// `{"products": [...]}`
#[derive(Debug, Serialize)]
pub struct ProductList {
    pub products: Vec<Product>,
}

/// `{"product": {...}}`, with provenance on reads.
#[derive(Debug, Serialize)]
pub struct ProductBody {
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

/// `{"message": "..."}`
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: &'static str,
}

/// `{"message": "Purchase successful", "inventory": n}`
#[derive(Debug, Serialize)]
pub struct PurchaseBody {
    pub message: &'static str,
    pub inventory: u64,
}

/// `{"views": n}`
#[derive(Debug, Serialize)]
pub struct ViewsBody {
    pub views: u64,
}

fn parse_id(raw: &str) -> Result<ProductId> {
    raw.parse()
        .map_err(|_| AppError::BadRequest("Invalid product id".to_string()))
}

fn parse_body(payload: std::result::Result<Json<ProductInput>, JsonRejection>) -> Result<ProductInput> {
    payload
        .map(|Json(input)| input)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// List every product.
pub async fn index<C: CacheStore, S: ProductStore>(
    State(state): State<AppState<C, S>>,
) -> Result<Json<ProductList>> {
    let products = state.inventory().list_products().await?;
    Ok(Json(ProductList { products }))
}

/// Show one product.
pub async fn show<C: CacheStore, S: ProductStore>(
    State(state): State<AppState<C, S>>,
    Path(id): Path<String>,
) -> Result<Json<ProductBody>> {
    let id = parse_id(&id)?;
    let sourced = state.inventory().get_product(id).await?;
    Ok(Json(ProductBody {
        product: sourced.value,
        source: Some(sourced.source),
    }))
}

/// Create a product.
pub async fn create<C: CacheStore, S: ProductStore>(
    State(state): State<AppState<C, S>>,
    payload: std::result::Result<Json<ProductInput>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductBody>)> {
    let input = parse_body(payload)?;
    let product = state.inventory().create_product(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ProductBody {
            product,
            source: None,
        }),
    ))
}

/// Overwrite a product.
pub async fn update<C: CacheStore, S: ProductStore>(
    State(state): State<AppState<C, S>>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<ProductInput>, JsonRejection>,
) -> Result<Json<MessageBody>> {
    let id = parse_id(&id)?;
    let input = parse_body(payload)?;
    state.inventory().update_product(id, input).await?;
    Ok(Json(MessageBody {
        message: "Product updated successfully",
    }))
}

/// Delete a product.
pub async fn destroy<C: CacheStore, S: ProductStore>(
    State(state): State<AppState<C, S>>,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>> {
    let id = parse_id(&id)?;
    state.inventory().delete_product(id).await?;
    Ok(Json(MessageBody {
        message: "Product deleted successfully",
    }))
}

/// Buy one unit.
pub async fn purchase<C: CacheStore, S: ProductStore>(
    State(state): State<AppState<C, S>>,
    Path(id): Path<String>,
) -> Result<Json<PurchaseBody>> {
    let id = parse_id(&id)?;
    let receipt = state.inventory().purchase(id).await?;
    Ok(Json(PurchaseBody {
        message: "Purchase successful",
        inventory: receipt.remaining,
    }))
}

/// Count a view.
pub async fn views<C: CacheStore, S: ProductStore>(
    State(state): State<AppState<C, S>>,
    Path(id): Path<String>,
) -> Result<Json<ViewsBody>> {
    let id = parse_id(&id)?;
    let views = state.inventory().record_view(id).await?;
    Ok(Json(ViewsBody { views }))
}

//! Cache maintenance routes.

use axum::{Json, extract::State};

use super::products::MessageBody;
use crate::cache::CacheStore;
use crate::db::ProductStore;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Drop every cache entry. Meant for testing and debugging.
pub async fn flush<C: CacheStore, S: ProductStore>(
    State(state): State<AppState<C, S>>,
) -> Result<Json<MessageBody>> {
    state
        .inventory()
        .flush_cache()
        .await
        .map_err(AppError::Flush)?;

    Ok(Json(MessageBody {
        message: "Cache flushed successfully",
    }))
}

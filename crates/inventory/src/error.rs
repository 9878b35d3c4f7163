//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`. Error bodies are `{"error": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{ErrorClass, InventoryError};

/// Application-level error type for the inventory service.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service operation failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// The cache flush failed.
    #[error("cache flush failed: {0}")]
    Flush(#[source] InventoryError),

    /// Bad request from client (malformed id or body).
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Inventory(err) => match err.class() {
                ErrorClass::NotFound => StatusCode::NOT_FOUND,
                ErrorClass::Client => StatusCode::BAD_REQUEST,
                ErrorClass::Server => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Flush(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Client-facing message. Internal details are never exposed.
    fn public_message(&self) -> String {
        match self {
            Self::Inventory(err) => match err {
                InventoryError::NotFound(_) => "Product not found".to_string(),
                InventoryError::CatalogEmpty => "No products found".to_string(),
                InventoryError::Validation(e) => e.to_string(),
                InventoryError::OutOfStock(_) => {
                    "Product out of stock, better luck next time.. :(".to_string()
                }
                InventoryError::PurchaseFailed { .. } => "Could not process purchase".to_string(),
                InventoryError::Store(RepositoryError::Conflict(_)) => {
                    "Product rejected by the store".to_string()
                }
                InventoryError::CacheUnavailable(_) | InventoryError::Store(_) => {
                    "Internal server error".to_string()
                }
            },
            Self::Flush(_) => "Could not flush cache".to_string(),
            Self::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = ErrorResponse {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

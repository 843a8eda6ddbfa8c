use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::api_client::ApiError;
use crate::relay::RelayError;

/// Error type for the popup HTTP surface.
/// Implements `IntoResponse` so handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Background relay unavailable: {0}")]
    RelayUnavailable(#[from] RelayError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Validation(msg) => AppError::Validation(msg),
            ApiError::Api { status: 404, message } => AppError::NotFound(message),
            ApiError::Api { status, message } => AppError::Upstream { status, message },
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::RelayUnavailable(e) => {
                tracing::warn!("Relay unavailable: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "RELAY_UNAVAILABLE",
                    "The background relay is not responding".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Upstream { status, message } => {
                tracing::error!("Upstream API returned {status}: {message}");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "The resume backend returned an error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

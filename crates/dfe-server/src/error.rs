//! Server-facing error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingest::IntakeError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<IntakeError> for AppError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::TooManyFiles { .. }
            | IntakeError::InvalidFilename(_)
            | IntakeError::InvalidExtension(_)
            | IntakeError::EmptyContent(_) => AppError::Validation(err.to_string()),
            IntakeError::QueueFull | IntakeError::QueueClosed => AppError::Unavailable(err.to_string()),
            IntakeError::Store(e) => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Store(ref e) if e.is_transient() => {
                tracing::warn!(error = %e, "Store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "The document store is unavailable".to_string())
            },
            AppError::Store(ref e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "A database error occurred".to_string())
            },
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::Validation(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::BadRequest(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Unavailable(ref message) => (StatusCode::SERVICE_UNAVAILABLE, message.clone()),
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            },
            AppError::Config(ref message) => {
                tracing::error!("Configuration error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string())
            },
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

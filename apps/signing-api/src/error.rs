//! Error types for the signing API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Signing token required")]
    TokenRequired,

    #[error("Invalid signing token")]
    TokenInvalid,

    #[error("Signing token has expired")]
    TokenExpired,

    #[error("Document already signed")]
    AlreadySigned,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Source artifact missing: {0}")]
    SourceMissing(String),

    #[error("Embedding failed: {0}")]
    EmbedFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match &self {
            ApiError::DocumentNotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("Document not found: {}", id),
                None,
            ),
            ApiError::TokenRequired => (
                StatusCode::UNAUTHORIZED,
                "Signing token required".to_string(),
                None,
            ),
            ApiError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                "Invalid signing token".to_string(),
                None,
            ),
            ApiError::TokenExpired => (
                StatusCode::GONE,
                "Signing token has expired".to_string(),
                None,
            ),
            ApiError::AlreadySigned => (
                StatusCode::CONFLICT,
                "Document already signed".to_string(),
                None,
            ),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::SourceMissing(url) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Source artifact missing: {}", url),
                None,
            ),
            ApiError::EmbedFailed(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Embedding failed: {}", msg),
                None,
            ),
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                // Persistence failures keep the driver's code in the body.
                let code = match e {
                    sqlx::Error::Database(db) => db.code().map(|c| c.to_string()),
                    _ => None,
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Database error: {}", e),
                    code,
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                    None,
                )
            }
        };

        let body = match code {
            Some(code) => Json(json!({
                "error": message,
                "status": status.as_u16(),
                "code": code,
            })),
            None => Json(json!({
                "error": message,
                "status": status.as_u16(),
            })),
        };

        (status, body).into_response()
    }
}

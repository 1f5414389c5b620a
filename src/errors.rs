use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cache::CacheError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    // Same response body as InvalidRefreshToken; kept apart for logs.
    #[error("Refresh token revoked")]
    TokenRevoked,

    #[error("User not found")]
    UserNotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found")]
    NotFound,

    #[error("Database error: {0}")]
    Db(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("JWT error")]
    Jwt,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Too many requests")]
    TooManyRequests,
}

impl From<mongodb::error::Error> for AppError {
    fn from(e: mongodb::error::Error) -> Self {
        AppError::Db(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::Validation(s) => (StatusCode::BAD_REQUEST, s.as_str()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid credentials"),
            AppError::InvalidRefreshToken | AppError::TokenRevoked => {
                (StatusCode::UNAUTHORIZED, "invalid refresh token")
            }
            AppError::UserNotFound => (StatusCode::NOT_FOUND, "user not found"),
            AppError::Conflict(s) => (StatusCode::CONFLICT, s.as_str()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found"),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database error"),
            AppError::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "cache error"),
            AppError::Jwt => (StatusCode::INTERNAL_SERVER_ERROR, "token error"),
            AppError::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "too many requests"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(json!({ "error": msg }))).into_response()
    }
}

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::commands;

/// Error returned by every handler, rendered as the error envelope
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match self {
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg,
        };

        let body = Json(json!({
            "success": false,
            "message": message,
            "error": {
                "code": code,
                "details": {},
            },
        }));

        (status, body).into_response()
    }
}

impl From<commands::Error> for AppError {
    fn from(err: commands::Error) -> Self {
        match err {
            commands::Error::NotFound(msg) => AppError::NotFound(msg.into_owned()),
            commands::Error::InvalidRequest(msg) => AppError::Validation(msg.into_owned()),
            commands::Error::Conflict(msg) => AppError::Conflict(msg.into_owned()),
            commands::Error::Unauthorized(msg) => AppError::Unauthorized(msg.into_owned()),
            commands::Error::Forbidden(msg) => AppError::Forbidden(msg.into_owned()),
            err @ commands::Error::Adapter(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

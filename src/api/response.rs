use std::borrow::Cow;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Success envelope: `{ success, message, data }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    #[serde(skip)]
    status: StatusCode,
    success: bool,
    message: Cow<'static, str>,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<Cow<'static, str>>, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn created(message: impl Into<Cow<'static, str>>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(message, data)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

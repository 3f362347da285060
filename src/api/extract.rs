//! Extractors rejecting with the API error envelope

use axum::extract::{FromRequest, FromRequestParts};

use super::error::AppError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

/// Path parameters, a malformed id is rejected before any command runs
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

use axum::{extract::State, Extension};
use serde::Deserialize;
use tower::Service;
use uuid::Uuid;

use crate::{
    commands::{Actor, CancelBooking, CreateBooking, GetBooking, SearchBookings},
    domain::{
        booking::{Booking, BookingDetails},
        search::{Page, SearchOptions},
    },
};

use super::{
    error::AppError,
    extract::{Json, Path},
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub class_id: Uuid,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<ApiResponse<Booking>, AppError> {
    let booking = state
        .logic
        .clone()
        .call(CreateBooking {
            class_id: req.class_id,
            user_id: actor.user_id,
        })
        .await?;

    Ok(ApiResponse::created("Booking created successfully", booking))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
) -> Result<ApiResponse<BookingDetails>, AppError> {
    let details = state
        .logic
        .clone()
        .call(GetBooking { booking_id, actor })
        .await?;

    Ok(ApiResponse::ok("Booking retrieved successfully", details))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
) -> Result<ApiResponse<bool>, AppError> {
    // Users may only cancel their own bookings
    state
        .logic
        .clone()
        .call(GetBooking { booking_id, actor })
        .await?;

    let cancelled = state
        .logic
        .clone()
        .call(CancelBooking { booking_id })
        .await?;

    Ok(ApiResponse::ok("Booking cancelled successfully", cancelled))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(options): Json<SearchOptions>,
) -> Result<ApiResponse<Page<BookingDetails>>, AppError> {
    let page = state
        .logic
        .clone()
        .call(SearchBookings { options, actor })
        .await?;

    Ok(ApiResponse::ok("Bookings retrieved successfully", page))
}

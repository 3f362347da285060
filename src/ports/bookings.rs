use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    booking::{Booking, BookingDetails, BookingField},
    search::{Page, Query},
};

use super::AdapterError;

#[mockall::automock]
#[async_trait::async_trait]
pub trait BookingStorePort: Send + Sync {
    async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, Error>;
    async fn get_booking_details(&self, booking_id: Uuid) -> Result<BookingDetails, Error>;
    /// Non-refunded booking of `user_id` on `class_id`, if any
    async fn find_active_booking(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<Booking>, Error>;
    /// Non-refunded bookings of `user_id` intersecting `[start_time, end_time)`
    async fn find_overlapping_bookings(
        &self,
        user_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Booking>, Error>;
    /// Store a confirmed booking, debit the class cost and take one seat, atomically
    ///
    /// Capacity, duplicate, overlap and credit conditions are checked again inside the same
    /// atomic unit. Nothing is written when any of them fails.
    async fn commit_booking(&self, booking: Booking) -> Result<Booking, Error>;
    /// Mark a booking refunded, give its seat back and credit `refund` if any, atomically
    ///
    /// Fails with `AlreadyCancelled` when the booking is already refunded.
    async fn commit_cancellation(
        &self,
        booking_id: Uuid,
        refund: Option<u32>,
    ) -> Result<Booking, Error>;
    async fn search_bookings(
        &self,
        query: Query<BookingField>,
    ) -> Result<Page<BookingDetails>, Error>;
}

/// Booking store errors
///
/// The display text of the business rule variants is part of the public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Booking not found")]
    BookingNotFound(Uuid),

    #[error("Class not found")]
    ClassNotFound(Uuid),

    #[error("User not found")]
    UserNotFound(Uuid),

    #[error("Class is full")]
    ClassFull(Uuid),

    #[error("You have already booked this class")]
    AlreadyBooked { user_id: Uuid, class_id: Uuid },

    #[error("Overlapping class booking not allowed")]
    OverlappingBooking { user_id: Uuid },

    #[error("Not enough credits")]
    InsufficientCredits { available: i64, required: u32 },

    #[error("Booking is already cancelled")]
    AlreadyCancelled(Uuid),

    #[error("adapter error: {0:?}")]
    Adapter(AdapterError),
}

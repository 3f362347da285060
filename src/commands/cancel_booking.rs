use std::task::{Context, Poll};

use chrono::Utc;
use tower::Service;
use uuid::Uuid;

use crate::ports::{
    bookings::{self, BookingStorePort},
    classes::ClassRegistryPort,
    memberships::MembershipStorePort,
    users::UserStorePort,
};

use super::{CommandFuture, DomainLogic, Error};

/// Cancel a booking, returning its seat and refunding credits inside the refund window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelBooking {
    pub booking_id: Uuid,
}

impl<C, U, B, M> Service<CancelBooking> for DomainLogic<C, U, B, M>
where
    C: ClassRegistryPort + ?Sized + 'static,
    U: UserStorePort + ?Sized + 'static,
    B: BookingStorePort + ?Sized + 'static,
    M: MembershipStorePort + ?Sized + 'static,
{
    type Response = bool;
    type Error = Error;
    type Future = CommandFuture<bool>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CancelBooking) -> Self::Future {
        let classes = self.classes.clone();
        let bookings = self.bookings.clone();
        let refund_policy = self.refund_policy;
        Box::pin(async move {
            let booking = bookings.get_booking(req.booking_id).await?;
            let class = classes.get_class(booking.class_id).await?;
            if !booking.is_active() {
                return Err(bookings::Error::AlreadyCancelled(booking.id).into());
            }

            // The booked interval is frozen on the booking, the cost is the class's current one
            let refund = refund_policy
                .refund_due(booking.start_time, Utc::now())
                .then_some(class.credit_cost);

            bookings.commit_cancellation(booking.id, refund).await?;

            tracing::debug!(
                booking_id = %booking.id,
                class_id = %class.id,
                user_id = %booking.user_id,
                refunded = refund.unwrap_or(0),
                "booking cancelled"
            );
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::database::MemoryDatabase,
        commands::{tests::memory_logic, CreateBooking},
        domain::{
            booking::{BookingStatus, RefundPolicy},
            class::{tests::new_class, ClassSession},
            membership::Membership,
            user::{Role, User},
        },
    };
    use chrono::Duration;
    use rstest::*;
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    struct Booked {
        database: MemoryDatabase,
        class: ClassSession,
        user: User,
        booking_id: Uuid,
    }

    /// A user with 10 credits holding a booking on a class costing 4
    async fn booked(starts_in: Duration) -> Result<Booked, BoxError> {
        let database = MemoryDatabase::default();
        let class = database
            .insert_class(ClassSession::create(new_class(3, 4, starts_in))?)
            .await?;
        let user = database
            .insert_user(User::new("u@example.com", "Member", "hash".into(), Role::User))
            .await?;
        database
            .commit_grant(Membership::new(user.id, 10))
            .await?;
        let booking = memory_logic(&database)
            .oneshot(CreateBooking {
                class_id: class.id,
                user_id: user.id,
            })
            .await?;

        Ok(Booked {
            database,
            class,
            user,
            booking_id: booking.id,
        })
    }

    #[rstest]
    #[case(Duration::hours(3), 10)]
    #[case(Duration::hours(2) + Duration::minutes(1), 10)]
    #[case(Duration::hours(1), 6)]
    #[case(Duration::hours(-1), 6)]
    #[tokio::test]
    async fn test_refund_window(
        #[case] starts_in: Duration,
        #[case] expected_credits: i64,
    ) -> Result<(), BoxError> {
        // GIVEN a booking on a class starting in `starts_in`
        let Booked {
            database,
            class,
            user,
            booking_id,
        } = booked(starts_in).await?;

        // WHEN cancelling it
        let res = memory_logic(&database)
            .oneshot(CancelBooking { booking_id })
            .await;

        // THEN
        // * the seat always goes back
        // * credits only come back outside the refund window
        assert_that!(res).is_ok().is_true();
        assert_that!(database.get_booking(booking_id).await?.status)
            .is_equal_to(BookingStatus::Refunded);
        assert_that!(database.get_class(class.id).await?.remaining_capacity).is_equal_to(3);
        assert_that!(database.get_user(user.id).await?.credits).is_equal_to(expected_credits);

        Ok(())
    }

    #[tokio::test]
    async fn test_double_cancel_never_refunds_twice() -> Result<(), BoxError> {
        // GIVEN a booking that was already cancelled
        let Booked {
            database,
            class,
            user,
            booking_id,
        } = booked(Duration::days(1)).await?;
        let domain = memory_logic(&database);
        domain.clone().oneshot(CancelBooking { booking_id }).await?;

        // WHEN cancelling it again
        let res = domain.oneshot(CancelBooking { booking_id }).await;

        // THEN it is rejected and nothing moves
        assert_that!(res).is_err().matches(|err| {
            matches!(err, Error::InvalidRequest(m) if m == "Booking is already cancelled")
        });
        assert_that!(database.get_user(user.id).await?.credits).is_equal_to(10);
        assert_that!(database.get_class(class.id).await?.remaining_capacity).is_equal_to(3);

        Ok(())
    }

    #[tokio::test]
    async fn test_custom_refund_window() -> Result<(), BoxError> {
        // GIVEN a booking three hours ahead and a four hour refund window
        let Booked {
            database,
            user,
            booking_id,
            ..
        } = booked(Duration::hours(3)).await?;
        let domain = memory_logic(&database).with_refund_policy(RefundPolicy::from_minutes(240));

        // WHEN cancelling it
        domain.oneshot(CancelBooking { booking_id }).await?;

        // THEN no refund is issued
        assert_that!(database.get_user(user.id).await?.credits).is_equal_to(6);

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_booking() {
        let res = memory_logic(&MemoryDatabase::default())
            .oneshot(CancelBooking {
                booking_id: Uuid::new_v4(),
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::NotFound(m) if m == "Booking not found"));
    }
}

use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::booking::Booking,
    ports::{
        bookings::{self, BookingStorePort},
        classes::ClassRegistryPort,
        memberships::MembershipStorePort,
        users::UserStorePort,
    },
};

use super::{CommandFuture, DomainLogic, Error};

/// Book a class for a user against their credit balance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateBooking {
    pub class_id: Uuid,
    pub user_id: Uuid,
}

impl<C, U, B, M> Service<CreateBooking> for DomainLogic<C, U, B, M>
where
    C: ClassRegistryPort + ?Sized + 'static,
    U: UserStorePort + ?Sized + 'static,
    B: BookingStorePort + ?Sized + 'static,
    M: MembershipStorePort + ?Sized + 'static,
{
    type Response = Booking;
    type Error = Error;
    type Future = CommandFuture<Booking>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateBooking) -> Self::Future {
        let classes = self.classes.clone();
        let users = self.users.clone();
        let bookings = self.bookings.clone();
        Box::pin(async move {
            // The order of the checks decides which error the caller sees
            let class = classes.get_class(req.class_id).await?;
            if class.is_full() {
                return Err(bookings::Error::ClassFull(class.id).into());
            }

            if bookings
                .find_active_booking(req.user_id, class.id)
                .await?
                .is_some()
            {
                return Err(bookings::Error::AlreadyBooked {
                    user_id: req.user_id,
                    class_id: class.id,
                }
                .into());
            }

            let overlapping = bookings
                .find_overlapping_bookings(req.user_id, class.start_time, class.end_time)
                .await?;
            if !overlapping.is_empty() {
                return Err(bookings::Error::OverlappingBooking {
                    user_id: req.user_id,
                }
                .into());
            }

            let user = users.get_user(req.user_id).await?;
            if user.credits < i64::from(class.credit_cost) {
                return Err(bookings::Error::InsufficientCredits {
                    available: user.credits,
                    required: class.credit_cost,
                }
                .into());
            }

            // The store checks every condition again inside the commit
            let booking = bookings
                .commit_booking(Booking::confirmed(&class, user.id))
                .await?;

            tracing::debug!(
                booking_id = %booking.id,
                class_id = %class.id,
                user_id = %user.id,
                credits = class.credit_cost,
                "booking committed"
            );
            Ok(booking)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::database::MemoryDatabase,
        commands::tests::memory_logic,
        domain::{
            class::{tests::new_class, ClassSession, NewClass},
            membership::Membership,
            user::{Role, User},
        },
        ports::{
            bookings::MockBookingStorePort, classes::MockClassRegistryPort,
            memberships::MockMembershipStorePort, users::MockUserStorePort,
        },
    };
    use chrono::{DateTime, Duration, Utc};
    use mockall::predicate::*;
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::{BoxError, ServiceExt};

    async fn user_with_credits(database: &MemoryDatabase, email: &str, credits: u32) -> User {
        let user = database
            .insert_user(User::new(email, "Member", "hash".into(), Role::User))
            .await
            .unwrap();
        if credits > 0 {
            database
                .commit_grant(Membership::new(user.id, credits))
                .await
                .unwrap();
        }
        database.get_user(user.id).await.unwrap()
    }

    async fn class(database: &MemoryDatabase, capacity: u32, cost: u32, starts_in: Duration) -> ClassSession {
        database
            .insert_class(ClassSession::create(new_class(capacity, cost, starts_in)).unwrap())
            .await
            .unwrap()
    }

    /// One hour class starting exactly at `start_time`
    async fn class_at(database: &MemoryDatabase, start_time: DateTime<Utc>) -> ClassSession {
        let class = NewClass {
            start_time,
            end_time: start_time + Duration::hours(1),
            ..new_class(5, 1, Duration::zero())
        };
        database
            .insert_class(ClassSession::create(class).unwrap())
            .await
            .unwrap()
    }

    fn invalid_request(message: &'static str) -> impl Fn(&Error) -> bool {
        move |err| matches!(err, Error::InvalidRequest(m) if m == message)
    }

    #[tokio::test]
    async fn test_last_seat() -> Result<(), BoxError> {
        // GIVEN
        // * a class with one seat costing 5 credits
        // * two users with 10 credits each
        let database = MemoryDatabase::default();
        let class = class(&database, 1, 5, Duration::days(1)).await;
        let first = user_with_credits(&database, "u@example.com", 10).await;
        let second = user_with_credits(&database, "v@example.com", 10).await;
        let domain = memory_logic(&database);

        // WHEN both users book the class
        let res_first = domain
            .clone()
            .oneshot(CreateBooking {
                class_id: class.id,
                user_id: first.id,
            })
            .await;
        let res_second = domain
            .clone()
            .oneshot(CreateBooking {
                class_id: class.id,
                user_id: second.id,
            })
            .await;

        // THEN
        // * the first booking succeeds and copies the class interval
        // * the second fails because the class is full
        // * counters moved exactly once
        assert_that!(res_first).is_ok().matches(|booking| {
            booking.start_time == class.start_time && booking.end_time == class.end_time
        });
        assert_that!(res_second)
            .is_err()
            .matches(invalid_request("Class is full"));
        assert_that!(database.get_class(class.id).await?.remaining_capacity).is_equal_to(0);
        assert_that!(database.get_user(first.id).await?.credits).is_equal_to(5);
        assert_that!(database.get_user(second.id).await?.credits).is_equal_to(10);

        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_booking() -> Result<(), BoxError> {
        // GIVEN a user who already booked a class
        let database = MemoryDatabase::default();
        let class = class(&database, 5, 1, Duration::days(1)).await;
        let user = user_with_credits(&database, "u@example.com", 10).await;
        let domain = memory_logic(&database);
        let req = CreateBooking {
            class_id: class.id,
            user_id: user.id,
        };
        domain.clone().oneshot(req.clone()).await?;

        // WHEN booking the same class again
        let res = domain.oneshot(req).await;

        // THEN it is rejected
        assert_that!(res)
            .is_err()
            .matches(invalid_request("You have already booked this class"));
        assert_that!(database.get_user(user.id).await?.credits).is_equal_to(9);

        Ok(())
    }

    #[rstest]
    #[case(Duration::minutes(30), true)]
    #[case(Duration::minutes(59), true)]
    #[case(Duration::minutes(-30), true)]
    #[case(Duration::minutes(60), false)]
    #[case(Duration::minutes(-60), false)]
    #[case(Duration::hours(3), false)]
    #[tokio::test]
    async fn test_overlap(
        #[case] offset: Duration,
        #[case] rejected: bool,
    ) -> Result<(), BoxError> {
        // GIVEN a user holding a one hour class starting tomorrow
        let database = MemoryDatabase::default();
        let anchor = Utc::now() + Duration::days(1);
        let base = class_at(&database, anchor).await;
        let other = class_at(&database, anchor + offset).await;
        let user = user_with_credits(&database, "u@example.com", 10).await;
        let domain = memory_logic(&database);
        domain
            .clone()
            .oneshot(CreateBooking {
                class_id: base.id,
                user_id: user.id,
            })
            .await?;

        // WHEN booking another class shifted by `offset`
        let res = domain
            .oneshot(CreateBooking {
                class_id: other.id,
                user_id: user.id,
            })
            .await;

        // THEN intersecting intervals are rejected, touching ones are fine
        if rejected {
            assert_that!(res)
                .is_err()
                .matches(invalid_request("Overlapping class booking not allowed"));
        } else {
            assert_that!(res).is_ok();
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_refunded_booking_does_not_block() -> Result<(), BoxError> {
        // GIVEN a user whose booking of a class was cancelled
        let database = MemoryDatabase::default();
        let class = class(&database, 5, 2, Duration::days(1)).await;
        let user = user_with_credits(&database, "u@example.com", 10).await;
        let domain = memory_logic(&database);
        let booking = domain
            .clone()
            .oneshot(CreateBooking {
                class_id: class.id,
                user_id: user.id,
            })
            .await?;
        database.commit_cancellation(booking.id, Some(2)).await?;

        // WHEN booking the class again
        let res = domain
            .oneshot(CreateBooking {
                class_id: class.id,
                user_id: user.id,
            })
            .await;

        // THEN it succeeds
        assert_that!(res).is_ok();

        Ok(())
    }

    #[tokio::test]
    async fn test_not_enough_credits() -> Result<(), BoxError> {
        // GIVEN a user with fewer credits than the class costs
        let database = MemoryDatabase::default();
        let class = class(&database, 5, 8, Duration::days(1)).await;
        let user = user_with_credits(&database, "u@example.com", 5).await;

        // WHEN booking the class
        let res = memory_logic(&database)
            .oneshot(CreateBooking {
                class_id: class.id,
                user_id: user.id,
            })
            .await;

        // THEN nothing changes
        assert_that!(res)
            .is_err()
            .matches(invalid_request("Not enough credits"));
        assert_that!(database.get_user(user.id).await?.credits).is_equal_to(5);
        assert_that!(database.get_class(class.id).await?.remaining_capacity).is_equal_to(5);

        Ok(())
    }

    #[fixture]
    fn class_id() -> Uuid {
        Uuid::new_v4()
    }

    #[rstest]
    #[tokio::test]
    async fn test_full_class_short_circuits(class_id: Uuid) -> Result<(), BoxError> {
        // GIVEN
        // * a class registry returning a full class
        // * booking and user stores that must not be called
        let mut full = ClassSession::create(new_class(2, 1, Duration::days(1)))?;
        full.id = class_id;
        full.remaining_capacity = 0;
        let mut classes = MockClassRegistryPort::new();
        classes
            .expect_get_class()
            .times(1)
            .with(eq(class_id))
            .returning(move |_| Ok(full.clone()));
        let mut bookings = MockBookingStorePort::new();
        bookings.expect_find_active_booking().never();
        bookings.expect_commit_booking().never();
        let mut users = MockUserStorePort::new();
        users.expect_get_user().never();

        let domain = DomainLogic::new(
            Arc::new(classes),
            Arc::new(users),
            Arc::new(bookings),
            Arc::new(MockMembershipStorePort::new()),
        );

        // WHEN calling the service
        let res = domain
            .clone()
            .oneshot(CreateBooking {
                class_id,
                user_id: Uuid::new_v4(),
            })
            .await;

        // THEN
        // * it fails with the capacity message
        // * only the class registry is called
        assert_that!(res)
            .is_err()
            .matches(invalid_request("Class is full"));
        Arc::into_inner(domain.classes).unwrap().checkpoint();

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_lost_race_surfaces_commit_error(class_id: Uuid) -> Result<(), BoxError> {
        // GIVEN every pre-check passing but the commit losing the last seat
        let class = {
            let mut class = ClassSession::create(new_class(1, 1, Duration::days(1)))?;
            class.id = class_id;
            class
        };
        let user = User::new("u@example.com", "Member", "hash".into(), Role::User);
        let user = User { credits: 3, ..user };
        let user_id = user.id;

        let mut classes = MockClassRegistryPort::new();
        let returned = class.clone();
        classes
            .expect_get_class()
            .returning(move |_| Ok(returned.clone()));
        let mut users = MockUserStorePort::new();
        users.expect_get_user().returning(move |_| Ok(user.clone()));
        let mut bookings = MockBookingStorePort::new();
        bookings
            .expect_find_active_booking()
            .returning(|_, _| Ok(None));
        bookings
            .expect_find_overlapping_bookings()
            .returning(|_, _, _| Ok(Vec::new()));
        bookings
            .expect_commit_booking()
            .times(1)
            .withf(move |booking| booking.class_id == class_id && booking.user_id == user_id)
            .returning(|booking| Err(bookings::Error::ClassFull(booking.class_id)));

        let domain = DomainLogic::new(
            Arc::new(classes),
            Arc::new(users),
            Arc::new(bookings),
            Arc::new(MockMembershipStorePort::new()),
        );

        // WHEN calling the service
        let res = domain.oneshot(CreateBooking { class_id, user_id }).await;

        // THEN the caller sees the same message as the pre-check would give
        assert_that!(res)
            .is_err()
            .matches(invalid_request("Class is full"));

        Ok(())
    }
}

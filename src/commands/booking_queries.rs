use uuid::Uuid;

use crate::{
    domain::{
        booking::{BookingDetails, BookingField},
        search::{Page, Query, SearchOptions},
    },
    ports::{
        bookings::{self, BookingStorePort},
        classes::ClassRegistryPort,
        memberships::MembershipStorePort,
        users::UserStorePort,
    },
};

use super::{Actor, DomainLogic, Error};

/// Fetch one booking with its user and class
///
/// Bookings of other users are reported as missing to non-administrators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetBooking {
    pub booking_id: Uuid,
    pub actor: Actor,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchBookings {
    pub options: SearchOptions,
    pub actor: Actor,
}

command!(GetBooking => BookingDetails, get_booking);
command!(SearchBookings => Page<BookingDetails>, search_bookings);

impl<C, U, B, M> DomainLogic<C, U, B, M>
where
    C: ClassRegistryPort + ?Sized,
    U: UserStorePort + ?Sized,
    B: BookingStorePort + ?Sized,
    M: MembershipStorePort + ?Sized,
{
    async fn get_booking(&self, req: GetBooking) -> Result<BookingDetails, Error> {
        let details = self.bookings.get_booking_details(req.booking_id).await?;
        if let Some(owner) = req.actor.scope() {
            if details.booking.user_id != owner {
                return Err(bookings::Error::BookingNotFound(req.booking_id).into());
            }
        }

        Ok(details)
    }

    async fn search_bookings(&self, req: SearchBookings) -> Result<Page<BookingDetails>, Error> {
        let mut query = Query::<BookingField>::from_options(req.options)?;
        if let Some(owner) = req.actor.scope() {
            query = query.owned_by(owner);
        }

        Ok(self.bookings.search_bookings(query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::database::MemoryDatabase,
        commands::{tests::memory_logic, CreateBooking},
        domain::{
            class::{tests::new_class, ClassSession},
            membership::Membership,
            user::{Role, User},
        },
    };
    use chrono::Duration;
    use rstest::*;
    use serde_json::json;
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    struct Fixture {
        database: MemoryDatabase,
        alice: Actor,
        bob: Actor,
        admin: Actor,
        alice_booking: Uuid,
    }

    async fn fixture() -> Result<Fixture, BoxError> {
        let database = MemoryDatabase::default();
        let yoga = database
            .insert_class(ClassSession::create(new_class(5, 1, Duration::days(1)))?)
            .await?;
        let mut spin = new_class(5, 1, Duration::days(2));
        spin.title = "Evening Spin".into();
        let spin = database.insert_class(ClassSession::create(spin)?).await?;

        let mut actors = Vec::new();
        for (email, name) in [("alice@example.com", "Alice"), ("bob@example.com", "Bob")] {
            let user = database
                .insert_user(User::new(email, name, "hash".into(), Role::User))
                .await?;
            database.commit_grant(Membership::new(user.id, 5)).await?;
            actors.push(Actor {
                user_id: user.id,
                role: Role::User,
            });
        }
        let (alice, bob) = (actors[0], actors[1]);

        let domain = memory_logic(&database);
        let alice_booking = domain
            .clone()
            .oneshot(CreateBooking {
                class_id: yoga.id,
                user_id: alice.user_id,
            })
            .await?;
        domain
            .clone()
            .oneshot(CreateBooking {
                class_id: spin.id,
                user_id: bob.user_id,
            })
            .await?;

        Ok(Fixture {
            database,
            alice,
            bob,
            admin: Actor {
                user_id: Uuid::new_v4(),
                role: Role::SuperAdmin,
            },
            alice_booking: alice_booking.id,
        })
    }

    #[tokio::test]
    async fn test_get_booking_enriched() -> Result<(), BoxError> {
        let fx = fixture().await?;

        let res = memory_logic(&fx.database)
            .oneshot(GetBooking {
                booking_id: fx.alice_booking,
                actor: fx.alice,
            })
            .await;

        assert_that!(res).is_ok().matches(|details| {
            details.user.as_ref().map(|user| user.name.as_str()) == Some("Alice")
                && details.class.as_ref().map(|class| class.remaining_capacity) == Some(4)
        });

        Ok(())
    }

    #[tokio::test]
    async fn test_get_booking_hidden_from_other_users() -> Result<(), BoxError> {
        let fx = fixture().await?;
        let domain = memory_logic(&fx.database);

        let as_bob = domain
            .clone()
            .oneshot(GetBooking {
                booking_id: fx.alice_booking,
                actor: fx.bob,
            })
            .await;
        let as_admin = domain
            .oneshot(GetBooking {
                booking_id: fx.alice_booking,
                actor: fx.admin,
            })
            .await;

        assert_that!(as_bob)
            .is_err()
            .matches(|err| matches!(err, Error::NotFound(_)));
        assert_that!(as_admin).is_ok();

        Ok(())
    }

    #[rstest]
    #[case::user_sees_own(false, None, 1)]
    #[case::admin_sees_all(true, None, 2)]
    #[case::admin_term(true, Some("spin"), 1)]
    #[case::admin_user_email(true, Some("ALICE@"), 1)]
    #[tokio::test]
    async fn test_search_bookings(
        #[case] as_admin: bool,
        #[case] term: Option<&str>,
        #[case] expected: usize,
    ) -> Result<(), BoxError> {
        let fx = fixture().await?;
        let options = SearchOptions {
            search_term: term.map(str::to_string),
            ..Default::default()
        };

        let res = memory_logic(&fx.database)
            .oneshot(SearchBookings {
                options,
                actor: if as_admin { fx.admin } else { fx.alice },
            })
            .await;

        assert_that!(res)
            .is_ok()
            .matches(|page| page.count == expected);

        Ok(())
    }

    #[tokio::test]
    async fn test_search_bookings_filter_by_status() -> Result<(), BoxError> {
        let fx = fixture().await?;
        let options: SearchOptions = serde_json::from_value(json!({
            "filterBy": [{ "status": "REFUNDED" }],
        }))?;

        let res = memory_logic(&fx.database)
            .oneshot(SearchBookings {
                options,
                actor: fx.admin,
            })
            .await;

        assert_that!(res).is_ok().matches(|page| page.count == 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_search_bookings_unknown_sort_field() -> Result<(), BoxError> {
        let fx = fixture().await?;
        let options = SearchOptions {
            sort: Some("password".into()),
            ..Default::default()
        };

        let res = memory_logic(&fx.database)
            .oneshot(SearchBookings {
                options,
                actor: fx.admin,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InvalidRequest(m) if m == "Unknown field: password"));

        Ok(())
    }
}

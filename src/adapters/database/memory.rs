use crate::{
    domain::{
        booking::{Booking, BookingDetails, BookingField, BookingStatus},
        class::{ClassChanges, ClassField, ClassSession, ClassSummary},
        credit::{CreditEvent, CreditReason},
        membership::{Membership, MembershipChange, MembershipDetails, MembershipField},
        search::{Page, Query},
        user::{User, UserField, UserSummary},
    },
    ports::{
        bookings::{self, BookingStorePort},
        classes::{self, ClassRegistryPort},
        memberships::{self, MembershipStorePort},
        users::{self, UserStorePort},
    },
};
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

/// In-process store for every port
///
/// All records live behind a single lock, so each multi-record commit is atomic with
/// respect to any other operation.
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    classes: HashMap<Uuid, ClassSession>,
    users: HashMap<Uuid, User>,
    bookings: HashMap<Uuid, Booking>,
    memberships: HashMap<Uuid, Membership>,
    credit_events: Vec<CreditEvent>,
}

impl State {
    fn booking_details(&self, booking: &Booking) -> BookingDetails {
        BookingDetails {
            booking: booking.clone(),
            user: self.users.get(&booking.user_id).map(UserSummary::from),
            class: self.classes.get(&booking.class_id).map(ClassSummary::from),
        }
    }

    fn membership_details(&self, membership: &Membership) -> MembershipDetails {
        MembershipDetails {
            membership: membership.clone(),
            user: self.users.get(&membership.user_id).map(UserSummary::from),
        }
    }

    fn active_bookings(&self, user_id: Uuid) -> impl Iterator<Item = &Booking> {
        self.bookings
            .values()
            .filter(move |booking| booking.user_id == user_id && booking.is_active())
    }

    /// Move a user's balance and record the change
    ///
    /// Returns the new balance, or `None` when the user does not exist.
    fn apply_credits(
        &mut self,
        user_id: Uuid,
        delta: i64,
        reason: CreditReason,
        reference_id: Uuid,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        let user = self.users.get_mut(&user_id)?;
        user.credits += delta;
        user.updated_at = now;
        let balance = user.credits;

        self.credit_events
            .push(CreditEvent::new(user_id, delta, balance, reason, reference_id));

        Some(balance)
    }
}

impl MemoryDatabase {
    fn lock(&self) -> Result<MutexGuard<'_, State>, ErasedPoisonError> {
        self.state.lock().map_err(ErasedPoisonError::from)
    }
}

#[async_trait::async_trait]
impl ClassRegistryPort for MemoryDatabase {
    async fn get_class(&self, class_id: Uuid) -> Result<ClassSession, classes::Error> {
        self.lock()?
            .classes
            .get(&class_id)
            .cloned()
            .ok_or(classes::Error::ClassNotFound(class_id))
    }

    async fn insert_class(&self, class: ClassSession) -> Result<ClassSession, classes::Error> {
        self.lock()?.classes.insert(class.id, class.clone());
        Ok(class)
    }

    async fn update_class(
        &self,
        class_id: Uuid,
        changes: ClassChanges,
    ) -> Result<ClassSession, classes::Error> {
        let mut state = self.lock()?;
        let class = state
            .classes
            .get_mut(&class_id)
            .ok_or(classes::Error::ClassNotFound(class_id))?;

        *class = class.apply(changes)?;
        Ok(class.clone())
    }

    async fn delete_class(&self, class_id: Uuid) -> Result<(), classes::Error> {
        let mut state = self.lock()?;
        if state
            .bookings
            .values()
            .any(|booking| booking.class_id == class_id && booking.is_active())
        {
            return Err(classes::Error::HasActiveBookings(class_id));
        }

        state
            .classes
            .remove(&class_id)
            .map(|_| ())
            .ok_or(classes::Error::ClassNotFound(class_id))
    }

    async fn search_classes(
        &self,
        query: Query<ClassField>,
    ) -> Result<Page<ClassSession>, classes::Error> {
        let state = self.lock()?;
        Ok(query.apply(state.classes.values().cloned()))
    }
}

#[async_trait::async_trait]
impl UserStorePort for MemoryDatabase {
    async fn get_user(&self, user_id: Uuid) -> Result<User, users::Error> {
        self.lock()?
            .users
            .get(&user_id)
            .cloned()
            .ok_or(users::Error::UserNotFound(user_id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, users::Error> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn insert_user(&self, user: User) -> Result<User, users::Error> {
        let mut state = self.lock()?;
        if state.users.values().any(|other| other.email == user.email) {
            return Err(users::Error::EmailTaken(user.email));
        }

        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(&self, user: User) -> Result<User, users::Error> {
        let mut state = self.lock()?;
        if state
            .users
            .values()
            .any(|other| other.id != user.id && other.email == user.email)
        {
            return Err(users::Error::EmailTaken(user.email));
        }

        let stored = state
            .users
            .get_mut(&user.id)
            .ok_or(users::Error::UserNotFound(user.id))?;
        stored.email = user.email;
        stored.name = user.name;
        stored.role = user.role;
        stored.password_hash = user.password_hash;
        stored.updated_at = Utc::now();

        Ok(stored.clone())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), users::Error> {
        self.lock()?
            .users
            .remove(&user_id)
            .map(|_| ())
            .ok_or(users::Error::UserNotFound(user_id))
    }

    async fn search_users(&self, query: Query<UserField>) -> Result<Page<User>, users::Error> {
        let state = self.lock()?;
        Ok(query.apply(state.users.values().cloned()))
    }

    async fn credit_history(&self, user_id: Uuid) -> Result<Vec<CreditEvent>, users::Error> {
        let state = self.lock()?;
        if !state.users.contains_key(&user_id) {
            return Err(users::Error::UserNotFound(user_id));
        }

        Ok(state
            .credit_events
            .iter()
            .filter(|event| event.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl BookingStorePort for MemoryDatabase {
    async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, bookings::Error> {
        self.lock()?
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(bookings::Error::BookingNotFound(booking_id))
    }

    async fn get_booking_details(
        &self,
        booking_id: Uuid,
    ) -> Result<BookingDetails, bookings::Error> {
        let state = self.lock()?;
        let booking = state
            .bookings
            .get(&booking_id)
            .ok_or(bookings::Error::BookingNotFound(booking_id))?;

        Ok(state.booking_details(booking))
    }

    async fn find_active_booking(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<Booking>, bookings::Error> {
        Ok(self
            .lock()?
            .active_bookings(user_id)
            .find(|booking| booking.class_id == class_id)
            .cloned())
    }

    async fn find_overlapping_bookings(
        &self,
        user_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Booking>, bookings::Error> {
        Ok(self
            .lock()?
            .active_bookings(user_id)
            .filter(|booking| booking.overlaps(start_time, end_time))
            .cloned()
            .collect())
    }

    async fn commit_booking(&self, booking: Booking) -> Result<Booking, bookings::Error> {
        let mut state = self.lock()?;

        let class = state
            .classes
            .get(&booking.class_id)
            .ok_or(bookings::Error::ClassNotFound(booking.class_id))?;
        if class.is_full() {
            return Err(bookings::Error::ClassFull(class.id));
        }
        let credit_cost = class.credit_cost;

        if state
            .active_bookings(booking.user_id)
            .any(|existing| existing.class_id == booking.class_id)
        {
            return Err(bookings::Error::AlreadyBooked {
                user_id: booking.user_id,
                class_id: booking.class_id,
            });
        }
        if state
            .active_bookings(booking.user_id)
            .any(|existing| existing.overlaps(booking.start_time, booking.end_time))
        {
            return Err(bookings::Error::OverlappingBooking {
                user_id: booking.user_id,
            });
        }

        let user = state
            .users
            .get(&booking.user_id)
            .ok_or(bookings::Error::UserNotFound(booking.user_id))?;
        if user.credits < i64::from(credit_cost) {
            return Err(bookings::Error::InsufficientCredits {
                available: user.credits,
                required: credit_cost,
            });
        }

        // All conditions hold, nothing below can fail
        let now = Utc::now();
        state.bookings.insert(booking.id, booking.clone());
        state.apply_credits(
            booking.user_id,
            -i64::from(credit_cost),
            CreditReason::BookingDebit,
            booking.id,
            now,
        );
        if let Some(class) = state.classes.get_mut(&booking.class_id) {
            class.remaining_capacity -= 1;
            class.updated_at = now;
        }

        Ok(booking)
    }

    async fn commit_cancellation(
        &self,
        booking_id: Uuid,
        refund: Option<u32>,
    ) -> Result<Booking, bookings::Error> {
        let mut state = self.lock()?;

        let booking = state
            .bookings
            .get(&booking_id)
            .ok_or(bookings::Error::BookingNotFound(booking_id))?;
        if !booking.is_active() {
            return Err(bookings::Error::AlreadyCancelled(booking_id));
        }
        let (user_id, class_id) = (booking.user_id, booking.class_id);
        if !state.classes.contains_key(&class_id) {
            return Err(bookings::Error::ClassNotFound(class_id));
        }

        let now = Utc::now();
        if let Some(class) = state.classes.get_mut(&class_id) {
            class.remaining_capacity = (class.remaining_capacity + 1).min(class.capacity);
            class.updated_at = now;
        }
        if let Some(credits) = refund {
            state.apply_credits(
                user_id,
                i64::from(credits),
                CreditReason::CancellationRefund,
                booking_id,
                now,
            );
        }

        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or(bookings::Error::BookingNotFound(booking_id))?;
        booking.status = BookingStatus::Refunded;
        booking.updated_at = now;

        Ok(booking.clone())
    }

    async fn search_bookings(
        &self,
        query: Query<BookingField>,
    ) -> Result<Page<BookingDetails>, bookings::Error> {
        let state = self.lock()?;
        let details = state
            .bookings
            .values()
            .filter(|booking| query.owner().map_or(true, |owner| booking.user_id == owner))
            .map(|booking| state.booking_details(booking));

        Ok(query.apply(details))
    }
}

#[async_trait::async_trait]
impl MembershipStorePort for MemoryDatabase {
    async fn get_membership(&self, membership_id: Uuid) -> Result<Membership, memberships::Error> {
        self.lock()?
            .memberships
            .get(&membership_id)
            .cloned()
            .ok_or(memberships::Error::MembershipNotFound(membership_id))
    }

    async fn commit_grant(
        &self,
        membership: Membership,
    ) -> Result<MembershipChange, memberships::Error> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&membership.user_id) {
            return Err(memberships::Error::UserNotFound(membership.user_id));
        }

        state.memberships.insert(membership.id, membership.clone());
        let balance = state.apply_credits(
            membership.user_id,
            i64::from(membership.credits_added),
            CreditReason::MembershipGrant,
            membership.id,
            Utc::now(),
        );

        Ok(MembershipChange {
            membership,
            balance,
        })
    }

    async fn commit_revoke(
        &self,
        membership_id: Uuid,
    ) -> Result<MembershipChange, memberships::Error> {
        let mut state = self.lock()?;
        let membership = state
            .memberships
            .remove(&membership_id)
            .ok_or(memberships::Error::MembershipNotFound(membership_id))?;

        let balance = state.apply_credits(
            membership.user_id,
            -i64::from(membership.credits_added),
            CreditReason::MembershipRevoke,
            membership.id,
            Utc::now(),
        );

        Ok(MembershipChange {
            membership,
            balance,
        })
    }

    async fn search_memberships(
        &self,
        query: Query<MembershipField>,
    ) -> Result<Page<MembershipDetails>, memberships::Error> {
        let state = self.lock()?;
        let details = state
            .memberships
            .values()
            .map(|membership| state.membership_details(membership));

        Ok(query.apply(details))
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for ErasedPoisonError {
    fn from(err: PoisonError<T>) -> Self {
        Self(err.to_string())
    }
}

impl From<ErasedPoisonError> for classes::Error {
    fn from(err: ErasedPoisonError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

impl From<ErasedPoisonError> for users::Error {
    fn from(err: ErasedPoisonError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

impl From<ErasedPoisonError> for bookings::Error {
    fn from(err: ErasedPoisonError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

impl From<ErasedPoisonError> for memberships::Error {
    fn from(err: ErasedPoisonError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{class::tests::new_class, user::Role};
    use chrono::Duration;
    use speculoos::prelude::*;

    async fn seed(database: &MemoryDatabase, credits: u32, class: ClassSession) -> User {
        let user = database
            .insert_user(User::new("jane@example.com", "Jane", "hash".into(), Role::User))
            .await
            .unwrap();
        database
            .commit_grant(Membership::new(user.id, credits))
            .await
            .unwrap();
        database.insert_class(class).await.unwrap();
        database.get_user(user.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_commit_booking_moves_counters() {
        let database = MemoryDatabase::default();
        let class = ClassSession::create(new_class(1, 5, Duration::days(1))).unwrap();
        let user = seed(&database, 10, class.clone()).await;

        let res = database.commit_booking(Booking::confirmed(&class, user.id)).await;

        assert_that!(res).is_ok();
        assert_that!(database.get_class(class.id).await)
            .is_ok()
            .matches(|class| class.remaining_capacity == 0);
        assert_that!(database.get_user(user.id).await)
            .is_ok()
            .matches(|user| user.credits == 5);
        assert_that!(database.credit_history(user.id).await)
            .is_ok()
            .matches(|events| {
                events.len() == 2
                    && events[1].reason == CreditReason::BookingDebit
                    && events[1].delta == -5
                    && events[1].balance_after == 5
            });
    }

    #[tokio::test]
    async fn test_commit_booking_revalidates_capacity() {
        let database = MemoryDatabase::default();
        let mut class = ClassSession::create(new_class(1, 5, Duration::days(1))).unwrap();
        class.remaining_capacity = 0;
        let user = seed(&database, 10, class.clone()).await;

        let res = database.commit_booking(Booking::confirmed(&class, user.id)).await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, bookings::Error::ClassFull(_)));
        assert_that!(database.get_user(user.id).await)
            .is_ok()
            .matches(|user| user.credits == 10);
        assert_that!(database.find_active_booking(user.id, class.id).await)
            .is_ok()
            .is_none();
    }

    #[tokio::test]
    async fn test_commit_cancellation_twice() {
        let database = MemoryDatabase::default();
        let class = ClassSession::create(new_class(3, 4, Duration::days(1))).unwrap();
        let user = seed(&database, 10, class.clone()).await;
        let booking = database
            .commit_booking(Booking::confirmed(&class, user.id))
            .await
            .unwrap();

        let first = database.commit_cancellation(booking.id, Some(4)).await;
        let second = database.commit_cancellation(booking.id, Some(4)).await;

        assert_that!(first)
            .is_ok()
            .matches(|booking| booking.status == BookingStatus::Refunded);
        assert_that!(second)
            .is_err()
            .matches(|err| matches!(err, bookings::Error::AlreadyCancelled(_)));
        assert_that!(database.get_user(user.id).await)
            .is_ok()
            .matches(|user| user.credits == 10);
        assert_that!(database.get_class(class.id).await)
            .is_ok()
            .matches(|class| class.remaining_capacity == 3);
    }

    #[tokio::test]
    async fn test_revoke_can_overdraw() {
        let database = MemoryDatabase::default();
        let class = ClassSession::create(new_class(3, 8, Duration::days(1))).unwrap();
        let user = seed(&database, 10, class.clone()).await;
        database
            .commit_booking(Booking::confirmed(&class, user.id))
            .await
            .unwrap();
        let membership = database
            .search_memberships(Query::new().owned_by(user.id))
            .await
            .unwrap()
            .content
            .remove(0)
            .membership;

        let res = database.commit_revoke(membership.id).await;

        assert_that!(res)
            .is_ok()
            .matches(|change| change.balance == Some(-8));
        assert_that!(database.get_membership(membership.id).await)
            .is_err()
            .matches(|err| matches!(err, memberships::Error::MembershipNotFound(_)));
    }

    #[tokio::test]
    async fn test_email_taken() {
        let database = MemoryDatabase::default();
        database
            .insert_user(User::new("jane@example.com", "Jane", "x".into(), Role::User))
            .await
            .unwrap();

        let res = database
            .insert_user(User::new("JANE@example.com", "Other Jane", "x".into(), Role::User))
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, users::Error::EmailTaken(_)));
    }
}

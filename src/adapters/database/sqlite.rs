//! SQLite storage for every port
//!
//! Identifiers are stored as hyphenated text and timestamps as unix milliseconds. Writes
//! touching more than one record run inside a single transaction, serialized by a write
//! gate so that the re-validation reads and the conditional updates see the same state.

use std::{collections::HashMap, str::FromStr, sync::Arc};

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool, Transaction,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    domain::{
        booking::{Booking, BookingDetails, BookingField, BookingStatus},
        class::{ClassChanges, ClassField, ClassSession, ClassSummary},
        credit::{CreditEvent, CreditReason},
        membership::{Membership, MembershipChange, MembershipDetails, MembershipField},
        search::{Page, Query},
        user::{Role, User, UserField, UserSummary},
    },
    ports::{
        bookings::{self, BookingStorePort},
        classes::{self, ClassRegistryPort},
        memberships::{self, MembershipStorePort},
        users::{self, UserStorePort},
    },
};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        name TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        credits INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS classes (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        end_time INTEGER NOT NULL,
        capacity INTEGER NOT NULL,
        remaining_capacity INTEGER NOT NULL,
        credit_cost INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bookings (
        id TEXT PRIMARY KEY,
        class_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        end_time INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS bookings_user_status ON bookings (user_id, status)",
    r#"
    CREATE TABLE IF NOT EXISTS memberships (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        credits_added INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS credit_events (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        delta INTEGER NOT NULL,
        balance_after INTEGER NOT NULL,
        reason TEXT NOT NULL,
        reference_id TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
];

#[derive(Clone, Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
}

impl SqliteDatabase {
    /// Open a pool on `url`, creating the database file if needed
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let filename = options.clone().get_filename();
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Database migrations completed");
        Ok(())
    }

    async fn fetch_class(&self, class_id: Uuid) -> Result<Option<ClassSession>, StoreError> {
        sqlx::query_as::<_, ClassRow>("SELECT * FROM classes WHERE id = ?")
            .bind(class_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(ClassSession::try_from)
            .transpose()
    }

    async fn fetch_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn fetch_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = ?")
            .bind(booking_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(Booking::try_from)
            .transpose()
    }

    async fn all_users(&self) -> Result<HashMap<Uuid, User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| User::try_from(row).map(|user| (user.id, user)))
            .collect()
    }

    async fn all_classes(&self) -> Result<HashMap<Uuid, ClassSession>, StoreError> {
        sqlx::query_as::<_, ClassRow>("SELECT * FROM classes")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| ClassSession::try_from(row).map(|class| (class.id, class)))
            .collect()
    }
}

#[async_trait::async_trait]
impl ClassRegistryPort for SqliteDatabase {
    async fn get_class(&self, class_id: Uuid) -> Result<ClassSession, classes::Error> {
        self.fetch_class(class_id)
            .await?
            .ok_or(classes::Error::ClassNotFound(class_id))
    }

    async fn insert_class(&self, class: ClassSession) -> Result<ClassSession, classes::Error> {
        sqlx::query(
            "INSERT INTO classes (id, title, description, start_time, end_time, capacity, \
             remaining_capacity, credit_cost, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(class.id.to_string())
        .bind(&class.title)
        .bind(&class.description)
        .bind(class.start_time.timestamp_millis())
        .bind(class.end_time.timestamp_millis())
        .bind(i64::from(class.capacity))
        .bind(i64::from(class.remaining_capacity))
        .bind(i64::from(class.credit_cost))
        .bind(class.created_at.timestamp_millis())
        .bind(class.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(class)
    }

    async fn update_class(
        &self,
        class_id: Uuid,
        changes: ClassChanges,
    ) -> Result<ClassSession, classes::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let current = sqlx::query_as::<_, ClassRow>("SELECT * FROM classes WHERE id = ?")
            .bind(class_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .map(ClassSession::try_from)
            .transpose()?
            .ok_or(classes::Error::ClassNotFound(class_id))?;

        let mut class = current.apply(changes)?;
        class.updated_at = Utc::now();

        sqlx::query(
            "UPDATE classes SET title = ?, description = ?, start_time = ?, end_time = ?, \
             capacity = ?, remaining_capacity = ?, credit_cost = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&class.title)
        .bind(&class.description)
        .bind(class.start_time.timestamp_millis())
        .bind(class.end_time.timestamp_millis())
        .bind(i64::from(class.capacity))
        .bind(i64::from(class.remaining_capacity))
        .bind(i64::from(class.credit_cost))
        .bind(class.updated_at.timestamp_millis())
        .bind(class.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(class)
    }

    async fn delete_class(&self, class_id: Uuid) -> Result<(), classes::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE class_id = ? AND status = ?")
                .bind(class_id.to_string())
                .bind(BookingStatus::Confirmed.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(StoreError::from)?;
        if active > 0 {
            return Err(classes::Error::HasActiveBookings(class_id));
        }

        let result = sqlx::query("DELETE FROM classes WHERE id = ?")
            .bind(class_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(classes::Error::ClassNotFound(class_id));
        }

        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn search_classes(
        &self,
        query: Query<ClassField>,
    ) -> Result<Page<ClassSession>, classes::Error> {
        let classes = self.all_classes().await?;
        Ok(query.apply(classes.into_values()))
    }
}

#[async_trait::async_trait]
impl UserStorePort for SqliteDatabase {
    async fn get_user(&self, user_id: Uuid) -> Result<User, users::Error> {
        self.fetch_user(user_id)
            .await?
            .ok_or(users::Error::UserNotFound(user_id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, users::Error> {
        Ok(
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)?
                .map(User::try_from)
                .transpose()?,
        )
    }

    async fn insert_user(&self, user: User) -> Result<User, users::Error> {
        sqlx::query(
            "INSERT INTO users (id, email, name, password_hash, role, credits, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.credits)
        .bind(user.created_at.timestamp_millis())
        .bind(user.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|err| email_conflict(err, &user.email))?;

        Ok(user)
    }

    async fn update_profile(&self, user: User) -> Result<User, users::Error> {
        let result = sqlx::query(
            "UPDATE users SET email = ?, name = ?, role = ?, password_hash = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(Utc::now().timestamp_millis())
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|err| email_conflict(err, &user.email))?;

        if result.rows_affected() == 0 {
            return Err(users::Error::UserNotFound(user.id));
        }
        self.get_user(user.id).await
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), users::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            return Err(users::Error::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn search_users(&self, query: Query<UserField>) -> Result<Page<User>, users::Error> {
        let users = self.all_users().await?;
        Ok(query.apply(users.into_values()))
    }

    async fn credit_history(&self, user_id: Uuid) -> Result<Vec<CreditEvent>, users::Error> {
        if self.fetch_user(user_id).await?.is_none() {
            return Err(users::Error::UserNotFound(user_id));
        }

        Ok(sqlx::query_as::<_, CreditEventRow>(
            "SELECT * FROM credit_events WHERE user_id = ? ORDER BY created_at, rowid",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?
        .into_iter()
        .map(CreditEvent::try_from)
        .collect::<Result<_, _>>()?)
    }
}

#[async_trait::async_trait]
impl BookingStorePort for SqliteDatabase {
    async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, bookings::Error> {
        self.fetch_booking(booking_id)
            .await?
            .ok_or(bookings::Error::BookingNotFound(booking_id))
    }

    async fn get_booking_details(
        &self,
        booking_id: Uuid,
    ) -> Result<BookingDetails, bookings::Error> {
        let booking = self
            .fetch_booking(booking_id)
            .await?
            .ok_or(bookings::Error::BookingNotFound(booking_id))?;
        let user = self.fetch_user(booking.user_id).await?;
        let class = self.fetch_class(booking.class_id).await?;

        Ok(BookingDetails {
            user: user.as_ref().map(UserSummary::from),
            class: class.as_ref().map(ClassSummary::from),
            booking,
        })
    }

    async fn find_active_booking(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<Booking>, bookings::Error> {
        Ok(sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings WHERE user_id = ? AND class_id = ? AND status = ? LIMIT 1",
        )
        .bind(user_id.to_string())
        .bind(class_id.to_string())
        .bind(BookingStatus::Confirmed.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?
        .map(Booking::try_from)
        .transpose()?)
    }

    async fn find_overlapping_bookings(
        &self,
        user_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Booking>, bookings::Error> {
        Ok(sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings WHERE user_id = ? AND status = ? \
             AND start_time < ? AND end_time > ?",
        )
        .bind(user_id.to_string())
        .bind(BookingStatus::Confirmed.as_str())
        .bind(end_time.timestamp_millis())
        .bind(start_time.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?
        .into_iter()
        .map(Booking::try_from)
        .collect::<Result<_, _>>()?)
    }

    async fn commit_booking(&self, booking: Booking) -> Result<Booking, bookings::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let class = sqlx::query_as::<_, ClassRow>("SELECT * FROM classes WHERE id = ?")
            .bind(booking.class_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .map(ClassSession::try_from)
            .transpose()?
            .ok_or(bookings::Error::ClassNotFound(booking.class_id))?;
        if class.is_full() {
            return Err(bookings::Error::ClassFull(class.id));
        }

        let duplicates: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE user_id = ? AND class_id = ? AND status = ?",
        )
        .bind(booking.user_id.to_string())
        .bind(booking.class_id.to_string())
        .bind(BookingStatus::Confirmed.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        if duplicates > 0 {
            return Err(bookings::Error::AlreadyBooked {
                user_id: booking.user_id,
                class_id: booking.class_id,
            });
        }

        let overlapping: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE user_id = ? AND status = ? \
             AND start_time < ? AND end_time > ?",
        )
        .bind(booking.user_id.to_string())
        .bind(BookingStatus::Confirmed.as_str())
        .bind(booking.end_time.timestamp_millis())
        .bind(booking.start_time.timestamp_millis())
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        if overlapping > 0 {
            return Err(bookings::Error::OverlappingBooking {
                user_id: booking.user_id,
            });
        }

        let available: i64 = sqlx::query_scalar("SELECT credits FROM users WHERE id = ?")
            .bind(booking.user_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .ok_or(bookings::Error::UserNotFound(booking.user_id))?;
        let cost = i64::from(class.credit_cost);
        if available < cost {
            return Err(bookings::Error::InsufficientCredits {
                available,
                required: class.credit_cost,
            });
        }

        sqlx::query(
            "INSERT INTO bookings (id, class_id, user_id, start_time, end_time, status, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(booking.id.to_string())
        .bind(booking.class_id.to_string())
        .bind(booking.user_id.to_string())
        .bind(booking.start_time.timestamp_millis())
        .bind(booking.end_time.timestamp_millis())
        .bind(booking.status.as_str())
        .bind(booking.created_at.timestamp_millis())
        .bind(booking.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let now = Utc::now();
        let seat = sqlx::query(
            "UPDATE classes SET remaining_capacity = remaining_capacity - 1, updated_at = ? \
             WHERE id = ? AND remaining_capacity > 0",
        )
        .bind(now.timestamp_millis())
        .bind(booking.class_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        if seat.rows_affected() == 0 {
            return Err(bookings::Error::ClassFull(booking.class_id));
        }

        let debited = sqlx::query(
            "UPDATE users SET credits = credits - ?, updated_at = ? WHERE id = ? AND credits >= ?",
        )
        .bind(cost)
        .bind(now.timestamp_millis())
        .bind(booking.user_id.to_string())
        .bind(cost)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        if debited.rows_affected() == 0 {
            return Err(bookings::Error::InsufficientCredits {
                available,
                required: class.credit_cost,
            });
        }

        let event = CreditEvent::new(
            booking.user_id,
            -cost,
            available - cost,
            CreditReason::BookingDebit,
            booking.id,
        );
        insert_credit_event(&mut tx, &event).await?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(booking)
    }

    async fn commit_cancellation(
        &self,
        booking_id: Uuid,
        refund: Option<u32>,
    ) -> Result<Booking, bookings::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let mut booking = sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = ?")
            .bind(booking_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?
            .map(Booking::try_from)
            .transpose()?
            .ok_or(bookings::Error::BookingNotFound(booking_id))?;
        if !booking.is_active() {
            return Err(bookings::Error::AlreadyCancelled(booking_id));
        }

        let now = Utc::now();
        let seat = sqlx::query(
            "UPDATE classes SET remaining_capacity = MIN(remaining_capacity + 1, capacity), \
             updated_at = ? WHERE id = ?",
        )
        .bind(now.timestamp_millis())
        .bind(booking.class_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        if seat.rows_affected() == 0 {
            return Err(bookings::Error::ClassNotFound(booking.class_id));
        }

        if let Some(credits) = refund {
            apply_credits(
                &mut tx,
                booking.user_id,
                i64::from(credits),
                CreditReason::CancellationRefund,
                booking.id,
                now,
            )
            .await?;
        }

        booking.status = BookingStatus::Refunded;
        booking.updated_at = now;
        sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(booking.status.as_str())
            .bind(now.timestamp_millis())
            .bind(booking.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(booking)
    }

    async fn search_bookings(
        &self,
        query: Query<BookingField>,
    ) -> Result<Page<BookingDetails>, bookings::Error> {
        let rows = match query.owner() {
            Some(owner) => {
                sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE user_id = ?")
                    .bind(owner.to_string())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(StoreError::from)?;

        let users = self.all_users().await?;
        let classes = self.all_classes().await?;
        let details = rows
            .into_iter()
            .map(|row| {
                Booking::try_from(row).map(|booking| BookingDetails {
                    user: users.get(&booking.user_id).map(UserSummary::from),
                    class: classes.get(&booking.class_id).map(ClassSummary::from),
                    booking,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(query.apply(details))
    }
}

#[async_trait::async_trait]
impl MembershipStorePort for SqliteDatabase {
    async fn get_membership(&self, membership_id: Uuid) -> Result<Membership, memberships::Error> {
        sqlx::query_as::<_, MembershipRow>("SELECT * FROM memberships WHERE id = ?")
            .bind(membership_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?
            .map(Membership::try_from)
            .transpose()?
            .ok_or(memberships::Error::MembershipNotFound(membership_id))
    }

    async fn commit_grant(
        &self,
        membership: Membership,
    ) -> Result<MembershipChange, memberships::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        sqlx::query(
            "INSERT INTO memberships (id, user_id, credits_added, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(membership.id.to_string())
        .bind(membership.user_id.to_string())
        .bind(i64::from(membership.credits_added))
        .bind(membership.created_at.timestamp_millis())
        .bind(membership.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let balance = apply_credits(
            &mut tx,
            membership.user_id,
            i64::from(membership.credits_added),
            CreditReason::MembershipGrant,
            membership.id,
            Utc::now(),
        )
        .await?
        .ok_or(memberships::Error::UserNotFound(membership.user_id))?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(MembershipChange {
            membership,
            balance: Some(balance),
        })
    }

    async fn commit_revoke(
        &self,
        membership_id: Uuid,
    ) -> Result<MembershipChange, memberships::Error> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let membership =
            sqlx::query_as::<_, MembershipRow>("SELECT * FROM memberships WHERE id = ?")
                .bind(membership_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(StoreError::from)?
                .map(Membership::try_from)
                .transpose()?
                .ok_or(memberships::Error::MembershipNotFound(membership_id))?;

        sqlx::query("DELETE FROM memberships WHERE id = ?")
            .bind(membership_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        let balance = apply_credits(
            &mut tx,
            membership.user_id,
            -i64::from(membership.credits_added),
            CreditReason::MembershipRevoke,
            membership.id,
            Utc::now(),
        )
        .await?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(MembershipChange {
            membership,
            balance,
        })
    }

    async fn search_memberships(
        &self,
        query: Query<MembershipField>,
    ) -> Result<Page<MembershipDetails>, memberships::Error> {
        let rows = sqlx::query_as::<_, MembershipRow>("SELECT * FROM memberships")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        let users = self.all_users().await?;

        let details = rows
            .into_iter()
            .map(|row| {
                Membership::try_from(row).map(|membership| MembershipDetails {
                    user: users.get(&membership.user_id).map(UserSummary::from),
                    membership,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(query.apply(details))
    }
}

/// Move a user's balance inside `tx` and record the change
///
/// Returns the new balance, or `None` when the user does not exist.
async fn apply_credits(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: Uuid,
    delta: i64,
    reason: CreditReason,
    reference_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<i64>, StoreError> {
    let updated = sqlx::query("UPDATE users SET credits = credits + ?, updated_at = ? WHERE id = ?")
        .bind(delta)
        .bind(now.timestamp_millis())
        .bind(user_id.to_string())
        .execute(&mut **tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Ok(None);
    }

    let balance: i64 = sqlx::query_scalar("SELECT credits FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_one(&mut **tx)
        .await?;

    let event = CreditEvent::new(user_id, delta, balance, reason, reference_id);
    insert_credit_event(tx, &event).await?;

    Ok(Some(balance))
}

async fn insert_credit_event(
    tx: &mut Transaction<'_, Sqlite>,
    event: &CreditEvent,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO credit_events (id, user_id, delta, balance_after, reason, reference_id, \
         created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.id.to_string())
    .bind(event.user_id.to_string())
    .bind(event.delta)
    .bind(event.balance_after)
    .bind(event.reason.as_str())
    .bind(event.reference_id.to_string())
    .bind(event.created_at.timestamp_millis())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn email_conflict(err: sqlx::Error, email: &str) -> users::Error {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            users::Error::EmailTaken(email.to_string())
        }
        err => StoreError::from(err).into(),
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    credits: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_id(&row.id)?,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role: Role::from_str(&row.role).map_err(StoreError::Corrupt)?,
            credits: row.credits,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClassRow {
    id: String,
    title: String,
    description: String,
    start_time: i64,
    end_time: i64,
    capacity: i64,
    remaining_capacity: i64,
    credit_cost: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ClassRow> for ClassSession {
    type Error = StoreError;

    fn try_from(row: ClassRow) -> Result<Self, Self::Error> {
        Ok(ClassSession {
            id: parse_id(&row.id)?,
            title: row.title,
            description: row.description,
            start_time: from_millis(row.start_time)?,
            end_time: from_millis(row.end_time)?,
            capacity: to_count(row.capacity)?,
            remaining_capacity: to_count(row.remaining_capacity)?,
            credit_cost: to_count(row.credit_cost)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: String,
    class_id: String,
    user_id: String,
    start_time: i64,
    end_time: i64,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: parse_id(&row.id)?,
            class_id: parse_id(&row.class_id)?,
            user_id: parse_id(&row.user_id)?,
            start_time: from_millis(row.start_time)?,
            end_time: from_millis(row.end_time)?,
            status: BookingStatus::from_str(&row.status).map_err(StoreError::Corrupt)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    id: String,
    user_id: String,
    credits_added: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Membership {
            id: parse_id(&row.id)?,
            user_id: parse_id(&row.user_id)?,
            credits_added: to_count(row.credits_added)?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CreditEventRow {
    id: String,
    user_id: String,
    delta: i64,
    balance_after: i64,
    reason: String,
    reference_id: String,
    created_at: i64,
}

impl TryFrom<CreditEventRow> for CreditEvent {
    type Error = StoreError;

    fn try_from(row: CreditEventRow) -> Result<Self, Self::Error> {
        Ok(CreditEvent {
            id: parse_id(&row.id)?,
            user_id: parse_id(&row.user_id)?,
            delta: row.delta,
            balance_after: row.balance_after,
            reason: CreditReason::from_str(&row.reason).map_err(StoreError::Corrupt)?,
            reference_id: parse_id(&row.reference_id)?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

fn parse_id(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|err| StoreError::Corrupt(format!("invalid id {value}: {err}")))
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("invalid timestamp {millis}")))
}

fn to_count(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("invalid count {value}")))
}

/// Failure below the port boundary
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for classes::Error {
    fn from(err: StoreError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

impl From<StoreError> for users::Error {
    fn from(err: StoreError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

impl From<StoreError> for bookings::Error {
    fn from(err: StoreError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

impl From<StoreError> for memberships::Error {
    fn from(err: StoreError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

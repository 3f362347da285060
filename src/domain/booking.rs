use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    class::{ClassSession, ClassSummary},
    search::{contains_term, FieldValue, QueryError, SearchField, Searchable},
    user::UserSummary,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    /// The booking was cancelled
    ///
    /// The seat went back to the class. Whether credits were returned depends on the
    /// refund window at cancellation time.
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "REFUNDED" => Ok(BookingStatus::Refunded),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// One user's reservation of one class session
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub class_id: Uuid,
    pub user_id: Uuid,
    /// Copied from the class when booking, later class edits do not move it
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn confirmed(class: &ClassSession, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            class_id: class.id,
            user_id,
            start_time: class.start_time,
            end_time: class.end_time,
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the booking still holds a seat
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Refunded
    }

    pub fn overlaps(&self, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> bool {
        intervals_overlap(self.start_time, self.end_time, start_time, end_time)
    }
}

/// Half-open interval intersection: touching intervals do not overlap
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Booking joined with the user and class it references
///
/// Either side is `None` when the referenced record was deleted by an administrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub user: Option<UserSummary>,
    pub class: Option<ClassSummary>,
}

/// Decides whether a cancellation returns the class credits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefundPolicy {
    window: Duration,
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self {
            window: Duration::hours(2),
        }
    }
}

impl RefundPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_minutes(minutes: u32) -> Self {
        Self::new(Duration::minutes(minutes.into()))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Refunds are only issued when strictly more than the window remains before start
    pub fn refund_due(&self, start_time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        start_time - now > self.window
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookingField {
    Status,
    StartTime,
    EndTime,
    UserId,
    ClassId,
    UserName,
    UserEmail,
    ClassTitle,
    CreatedAt,
    UpdatedAt,
}

impl FromStr for BookingField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "status" => Self::Status,
            "startTime" => Self::StartTime,
            "endTime" => Self::EndTime,
            "userId" => Self::UserId,
            "classId" => Self::ClassId,
            "user.name" => Self::UserName,
            "user.email" => Self::UserEmail,
            "class.title" => Self::ClassTitle,
            "createdAt" => Self::CreatedAt,
            "updatedAt" => Self::UpdatedAt,
            _ => return Err(QueryError::UnknownField(s.to_string())),
        })
    }
}

impl SearchField for BookingField {
    const CREATED_AT: Self = Self::CreatedAt;
}

impl Searchable for BookingDetails {
    type Field = BookingField;

    fn field(&self, field: BookingField) -> FieldValue {
        let booking = &self.booking;
        match field {
            BookingField::Status => FieldValue::Text(booking.status.as_str().to_string()),
            BookingField::StartTime => FieldValue::Time(booking.start_time),
            BookingField::EndTime => FieldValue::Time(booking.end_time),
            BookingField::UserId => FieldValue::Id(booking.user_id),
            BookingField::ClassId => FieldValue::Id(booking.class_id),
            BookingField::UserName => self
                .user
                .as_ref()
                .map_or(FieldValue::Null, |user| FieldValue::Text(user.name.clone())),
            BookingField::UserEmail => self
                .user
                .as_ref()
                .map_or(FieldValue::Null, |user| FieldValue::Text(user.email.clone())),
            BookingField::ClassTitle => self
                .class
                .as_ref()
                .map_or(FieldValue::Null, |class| FieldValue::Text(class.title.clone())),
            BookingField::CreatedAt => FieldValue::Time(booking.created_at),
            BookingField::UpdatedAt => FieldValue::Time(booking.updated_at),
        }
    }

    fn matches_term(&self, term: &str) -> bool {
        let user_match = self.user.as_ref().map_or(false, |user| {
            contains_term(&user.name, term) || contains_term(&user.email, term)
        });
        let class_match = self.class.as_ref().map_or(false, |class| {
            contains_term(&class.title, term)
                || contains_term(&class.start_time.to_rfc3339(), term)
                || contains_term(&class.end_time.to_rfc3339(), term)
        });

        user_match || class_match
    }

    fn owner(&self) -> Option<Uuid> {
        Some(self.booking.user_id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.booking.created_at
    }
}

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::search::{contains_term, FieldValue, QueryError, SearchField, Searchable};

/// A scheduled offering that users can book with credits
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSession {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Total number of seats, at least 1
    pub capacity: u32,
    /// Number of seats still available
    ///
    /// This never exceeds `capacity`. It only moves through bookings, cancellations and
    /// administrator edits.
    pub remaining_capacity: u32,
    /// Credits deducted from a user's balance when booking this class
    pub credit_cost: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClass {
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: u32,
    pub credit_cost: u32,
}

/// Partial edit of a class by an administrator
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub capacity: Option<u32>,
    pub remaining_capacity: Option<u32>,
    pub credit_cost: Option<u32>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClassError {
    #[error("Title must not be empty")]
    EmptyTitle,
    #[error("Description must not be empty")]
    EmptyDescription,
    #[error("Start time must be before end time")]
    InvalidInterval,
    #[error("Capacity must be at least 1")]
    ZeroCapacity,
    #[error("Remaining capacity cannot exceed capacity")]
    RemainingAboveCapacity,
    #[error("Capacity cannot be lower than the number of booked seats")]
    CapacityBelowBooked,
}

impl ClassSession {
    pub fn create(new: NewClass) -> Result<Self, ClassError> {
        let now = Utc::now();
        let class = Self {
            id: Uuid::new_v4(),
            title: new.title.trim().to_string(),
            description: new.description.trim().to_string(),
            start_time: new.start_time,
            end_time: new.end_time,
            capacity: new.capacity,
            remaining_capacity: new.capacity,
            credit_cost: new.credit_cost,
            created_at: now,
            updated_at: now,
        };
        class.validate()?;

        Ok(class)
    }

    pub fn is_full(&self) -> bool {
        self.remaining_capacity == 0
    }

    pub fn booked_seats(&self) -> u32 {
        self.capacity.saturating_sub(self.remaining_capacity)
    }

    /// Return a copy of this class with the administrator's changes applied
    ///
    /// When the capacity changes without an explicit remaining capacity, the number of
    /// booked seats is kept as is.
    pub fn apply(&self, changes: ClassChanges) -> Result<Self, ClassError> {
        let mut class = self.clone();

        if let Some(title) = changes.title {
            class.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            class.description = description.trim().to_string();
        }
        if let Some(start_time) = changes.start_time {
            class.start_time = start_time;
        }
        if let Some(end_time) = changes.end_time {
            class.end_time = end_time;
        }
        if let Some(credit_cost) = changes.credit_cost {
            class.credit_cost = credit_cost;
        }

        match (changes.capacity, changes.remaining_capacity) {
            (capacity, Some(remaining)) => {
                class.capacity = capacity.unwrap_or(class.capacity);
                class.remaining_capacity = remaining;
            }
            (Some(capacity), None) => {
                let booked = self.booked_seats();
                if capacity < booked {
                    return Err(ClassError::CapacityBelowBooked);
                }
                class.capacity = capacity;
                class.remaining_capacity = capacity - booked;
            }
            (None, None) => {}
        }

        class.validate()?;
        class.updated_at = Utc::now();

        Ok(class)
    }

    fn validate(&self) -> Result<(), ClassError> {
        if self.title.is_empty() {
            return Err(ClassError::EmptyTitle);
        }
        if self.description.is_empty() {
            return Err(ClassError::EmptyDescription);
        }
        if self.start_time >= self.end_time {
            return Err(ClassError::InvalidInterval);
        }
        if self.capacity == 0 {
            return Err(ClassError::ZeroCapacity);
        }
        if self.remaining_capacity > self.capacity {
            return Err(ClassError::RemainingAboveCapacity);
        }

        Ok(())
    }
}

/// Class fields embedded in booking responses
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: u32,
    pub credit_cost: u32,
    pub remaining_capacity: u32,
}

impl From<&ClassSession> for ClassSummary {
    fn from(class: &ClassSession) -> Self {
        Self {
            id: class.id,
            title: class.title.clone(),
            start_time: class.start_time,
            end_time: class.end_time,
            capacity: class.capacity,
            credit_cost: class.credit_cost,
            remaining_capacity: class.remaining_capacity,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassField {
    Title,
    StartTime,
    EndTime,
    Capacity,
    RemainingCapacity,
    CreditCost,
    CreatedAt,
    UpdatedAt,
}

impl FromStr for ClassField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "title" => Self::Title,
            "startTime" => Self::StartTime,
            "endTime" => Self::EndTime,
            "capacity" => Self::Capacity,
            "remainingCapacity" => Self::RemainingCapacity,
            "creditCost" => Self::CreditCost,
            "createdAt" => Self::CreatedAt,
            "updatedAt" => Self::UpdatedAt,
            _ => return Err(QueryError::UnknownField(s.to_string())),
        })
    }
}

impl SearchField for ClassField {
    const CREATED_AT: Self = Self::CreatedAt;
}

impl Searchable for ClassSession {
    type Field = ClassField;

    fn field(&self, field: ClassField) -> FieldValue {
        match field {
            ClassField::Title => FieldValue::Text(self.title.clone()),
            ClassField::StartTime => FieldValue::Time(self.start_time),
            ClassField::EndTime => FieldValue::Time(self.end_time),
            ClassField::Capacity => FieldValue::Number(self.capacity.into()),
            ClassField::RemainingCapacity => FieldValue::Number(self.remaining_capacity.into()),
            ClassField::CreditCost => FieldValue::Number(self.credit_cost.into()),
            ClassField::CreatedAt => FieldValue::Time(self.created_at),
            ClassField::UpdatedAt => FieldValue::Time(self.updated_at),
        }
    }

    fn matches_term(&self, term: &str) -> bool {
        contains_term(&self.title, term) || contains_term(&self.description, term)
    }

    fn owner(&self) -> Option<Uuid> {
        None
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{
    search::{contains_term, FieldValue, QueryError, SearchField, Searchable},
    user::UserSummary,
};

/// Administrative credit grant to a user
///
/// Deleting it takes the same amount of credits back from the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credits_added: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: Uuid, credits_added: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            credits_added,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of granting or revoking a membership
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    pub membership: Membership,
    /// User balance after the change, `None` if the user no longer exists
    pub balance: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipDetails {
    #[serde(flatten)]
    pub membership: Membership,
    pub user: Option<UserSummary>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipField {
    UserId,
    CreditsAdded,
    UserName,
    UserEmail,
    CreatedAt,
    UpdatedAt,
}

impl FromStr for MembershipField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "userId" => Self::UserId,
            "creditsToAdded" | "creditsAdded" => Self::CreditsAdded,
            "user.name" => Self::UserName,
            "user.email" => Self::UserEmail,
            "createdAt" => Self::CreatedAt,
            "updatedAt" => Self::UpdatedAt,
            _ => return Err(QueryError::UnknownField(s.to_string())),
        })
    }
}

impl SearchField for MembershipField {
    const CREATED_AT: Self = Self::CreatedAt;
}

impl Searchable for MembershipDetails {
    type Field = MembershipField;

    fn field(&self, field: MembershipField) -> FieldValue {
        match field {
            MembershipField::UserId => FieldValue::Id(self.membership.user_id),
            MembershipField::CreditsAdded => {
                FieldValue::Number(self.membership.credits_added.into())
            }
            MembershipField::UserName => self
                .user
                .as_ref()
                .map_or(FieldValue::Null, |user| FieldValue::Text(user.name.clone())),
            MembershipField::UserEmail => self
                .user
                .as_ref()
                .map_or(FieldValue::Null, |user| FieldValue::Text(user.email.clone())),
            MembershipField::CreatedAt => FieldValue::Time(self.membership.created_at),
            MembershipField::UpdatedAt => FieldValue::Time(self.membership.updated_at),
        }
    }

    /// Matches the user's name or email, or exactly the granted amount
    fn matches_term(&self, term: &str) -> bool {
        let user_match = self.user.as_ref().map_or(false, |user| {
            contains_term(&user.name, term) || contains_term(&user.email, term)
        });

        user_match || term.parse::<u32>().ok() == Some(self.membership.credits_added)
    }

    fn owner(&self) -> Option<Uuid> {
        Some(self.membership.user_id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.membership.created_at
    }
}

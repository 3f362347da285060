use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::search::{contains_term, FieldValue, QueryError, SearchField, Searchable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An account holding a credit balance
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Unique, stored lowercase
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    /// Cached credit balance
    ///
    /// Every change to it is recorded as a `CreditEvent`. Revoking a membership after the
    /// credits were spent can drive it below zero.
    pub credits: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, name: &str, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            name: name.trim().to_string(),
            password_hash,
            role,
            credits: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal shape check, full address validation is left to the mail provider
pub fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

/// At least 8 characters with lowercase, uppercase, digit and symbol
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric())
}

/// User fields embedded in booking and membership responses
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserField {
    Email,
    Name,
    Role,
    Credits,
    CreatedAt,
    UpdatedAt,
}

impl FromStr for UserField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "email" => Self::Email,
            "name" => Self::Name,
            "role" => Self::Role,
            "credits" => Self::Credits,
            "createdAt" => Self::CreatedAt,
            "updatedAt" => Self::UpdatedAt,
            _ => return Err(QueryError::UnknownField(s.to_string())),
        })
    }
}

impl SearchField for UserField {
    const CREATED_AT: Self = Self::CreatedAt;
}

impl Searchable for User {
    type Field = UserField;

    fn field(&self, field: UserField) -> FieldValue {
        match field {
            UserField::Email => FieldValue::Text(self.email.clone()),
            UserField::Name => FieldValue::Text(self.name.clone()),
            UserField::Role => FieldValue::Text(self.role.as_str().to_string()),
            UserField::Credits => FieldValue::Number(self.credits),
            UserField::CreatedAt => FieldValue::Time(self.created_at),
            UserField::UpdatedAt => FieldValue::Time(self.updated_at),
        }
    }

    fn matches_term(&self, term: &str) -> bool {
        contains_term(&self.email, term) || contains_term(&self.name, term)
    }

    fn owner(&self) -> Option<Uuid> {
        Some(self.id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

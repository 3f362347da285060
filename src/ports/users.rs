use uuid::Uuid;

use crate::domain::{
    credit::CreditEvent,
    search::{Page, Query},
    user::{User, UserField},
};

use super::AdapterError;

#[mockall::automock]
#[async_trait::async_trait]
pub trait UserStorePort: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<User, Error>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, Error>;
    async fn insert_user(&self, user: User) -> Result<User, Error>;
    /// Persist email, name, role and password hash
    ///
    /// The credit balance is left as stored: it only moves through bookings, cancellations
    /// and memberships.
    async fn update_profile(&self, user: User) -> Result<User, Error>;
    async fn delete_user(&self, user_id: Uuid) -> Result<(), Error>;
    async fn search_users(&self, query: Query<UserField>) -> Result<Page<User>, Error>;
    /// Credit events for a user, oldest first
    async fn credit_history(&self, user_id: Uuid) -> Result<Vec<CreditEvent>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("User not found")]
    UserNotFound(Uuid),

    #[error("User with email {0} already exists")]
    EmailTaken(String),

    #[error("adapter error: {0:?}")]
    Adapter(AdapterError),
}

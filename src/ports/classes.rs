use uuid::Uuid;

use crate::domain::{
    class::{ClassChanges, ClassError, ClassField, ClassSession},
    search::{Page, Query},
};

use super::AdapterError;

#[mockall::automock]
#[async_trait::async_trait]
pub trait ClassRegistryPort: Send + Sync {
    async fn get_class(&self, class_id: Uuid) -> Result<ClassSession, Error>;
    async fn insert_class(&self, class: ClassSession) -> Result<ClassSession, Error>;
    /// Apply an administrator's edit against the current stored state
    async fn update_class(&self, class_id: Uuid, changes: ClassChanges)
        -> Result<ClassSession, Error>;
    /// Remove a class that no confirmed booking refers to
    async fn delete_class(&self, class_id: Uuid) -> Result<(), Error>;
    async fn search_classes(&self, query: Query<ClassField>) -> Result<Page<ClassSession>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Class not found")]
    ClassNotFound(Uuid),

    /// Confirmed bookings still hold seats in the class
    #[error("Class has active bookings")]
    HasActiveBookings(Uuid),

    /// The edit would break a class invariant
    #[error("{0}")]
    Invalid(#[from] ClassError),

    #[error("adapter error: {0:?}")]
    Adapter(AdapterError),
}

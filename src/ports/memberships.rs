use uuid::Uuid;

use crate::domain::{
    membership::{Membership, MembershipChange, MembershipDetails, MembershipField},
    search::{Page, Query},
};

use super::AdapterError;

#[mockall::automock]
#[async_trait::async_trait]
pub trait MembershipStorePort: Send + Sync {
    async fn get_membership(&self, membership_id: Uuid) -> Result<Membership, Error>;
    /// Store the membership and credit the user, atomically
    async fn commit_grant(&self, membership: Membership) -> Result<MembershipChange, Error>;
    /// Delete the membership and debit the granted amount, atomically
    ///
    /// The debit is applied in full even when it leaves the balance negative.
    async fn commit_revoke(&self, membership_id: Uuid) -> Result<MembershipChange, Error>;
    async fn search_memberships(
        &self,
        query: Query<MembershipField>,
    ) -> Result<Page<MembershipDetails>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Membership not found")]
    MembershipNotFound(Uuid),

    #[error("User not found")]
    UserNotFound(Uuid),

    #[error("adapter error: {0:?}")]
    Adapter(AdapterError),
}

use serde::Serialize;
use uuid::Uuid;

use crate::{
    domain::{
        membership::{Membership, MembershipDetails, MembershipField},
        search::{Page, Query, SearchOptions},
    },
    ports::{
        bookings::BookingStorePort, classes::ClassRegistryPort,
        memberships::MembershipStorePort, users::UserStorePort,
    },
};

use super::{Actor, DomainLogic, Error};

/// Grant credits to a user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantMembership {
    pub user_id: Uuid,
    pub credits_to_add: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipGranted {
    pub membership: Membership,
    pub balance: i64,
}

/// Delete a membership, taking its credits back in full
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevokeMembership {
    pub membership_id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRevoked {
    pub membership: Membership,
    /// `None` when the user was deleted in the meantime
    pub balance: Option<i64>,
    /// The revocation left the user with a negative balance
    pub overdrawn: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchMemberships {
    pub options: SearchOptions,
    pub actor: Actor,
}

command!(GrantMembership => MembershipGranted, grant_membership);
command!(RevokeMembership => MembershipRevoked, revoke_membership);
command!(SearchMemberships => Page<MembershipDetails>, search_memberships);

impl<C, U, B, M> DomainLogic<C, U, B, M>
where
    C: ClassRegistryPort + ?Sized,
    U: UserStorePort + ?Sized,
    B: BookingStorePort + ?Sized,
    M: MembershipStorePort + ?Sized,
{
    async fn grant_membership(&self, req: GrantMembership) -> Result<MembershipGranted, Error> {
        if req.credits_to_add < 1 {
            return Err(Error::InvalidRequest(
                "Credits to add must be at least 1".into(),
            ));
        }

        // Surface a missing user before writing anything
        let user = self.users.get_user(req.user_id).await?;
        let change = self
            .memberships
            .commit_grant(Membership::new(user.id, req.credits_to_add))
            .await?;
        let balance = change.balance.unwrap_or(user.credits);

        tracing::info!(
            membership_id = %change.membership.id,
            user_id = %user.id,
            credits = req.credits_to_add,
            balance,
            "membership granted"
        );
        Ok(MembershipGranted {
            membership: change.membership,
            balance,
        })
    }

    async fn revoke_membership(&self, req: RevokeMembership) -> Result<MembershipRevoked, Error> {
        let change = self.memberships.commit_revoke(req.membership_id).await?;
        let overdrawn = change.balance.map_or(false, |balance| balance < 0);

        if overdrawn {
            tracing::warn!(
                membership_id = %change.membership.id,
                user_id = %change.membership.user_id,
                balance = ?change.balance,
                "membership revocation left a negative balance"
            );
        } else {
            tracing::info!(membership_id = %change.membership.id, "membership revoked");
        }

        Ok(MembershipRevoked {
            membership: change.membership,
            balance: change.balance,
            overdrawn,
        })
    }

    async fn search_memberships(
        &self,
        req: SearchMemberships,
    ) -> Result<Page<MembershipDetails>, Error> {
        let mut query = Query::<MembershipField>::from_options(req.options)?;
        if let Some(owner) = req.actor.scope() {
            query = query.owned_by(owner);
        }

        Ok(self.memberships.search_memberships(query).await?)
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
            membership::MembershipChange,
            user::{Role, User},
        },
        ports::{
            bookings::MockBookingStorePort, classes::MockClassRegistryPort,
            memberships::MockMembershipStorePort, users::{self, MockUserStorePort},
        },
    };
    use chrono::Duration;
    use mockall::predicate::*;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::{BoxError, ServiceExt};

    async fn user(database: &MemoryDatabase, email: &str) -> Result<User, BoxError> {
        Ok(database
            .insert_user(User::new(email, "Member", "hash".into(), Role::User))
            .await?)
    }

    #[tokio::test]
    async fn test_grant_adds_credits() -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        let user = user(&database, "u@example.com").await?;
        let domain = memory_logic(&database);

        domain
            .clone()
            .oneshot(GrantMembership {
                user_id: user.id,
                credits_to_add: 20,
            })
            .await?;
        let res = domain
            .oneshot(GrantMembership {
                user_id: user.id,
                credits_to_add: 5,
            })
            .await;

        assert_that!(res).is_ok().matches(|granted| granted.balance == 25);
        assert_that!(database.get_user(user.id).await?.credits).is_equal_to(25);

        Ok(())
    }

    #[tokio::test]
    async fn test_grant_unknown_user() {
        // GIVEN a user store without the user and a membership store that must stay untouched
        let user_id = Uuid::new_v4();
        let mut users = MockUserStorePort::new();
        users
            .expect_get_user()
            .times(1)
            .with(eq(user_id))
            .returning(|id| Err(users::Error::UserNotFound(id)));
        let mut memberships = MockMembershipStorePort::new();
        memberships.expect_commit_grant().never();
        let domain = DomainLogic::new(
            Arc::new(MockClassRegistryPort::new()),
            Arc::new(users),
            Arc::new(MockBookingStorePort::new()),
            Arc::new(memberships),
        );

        // WHEN granting credits
        let res = domain
            .oneshot(GrantMembership {
                user_id,
                credits_to_add: 10,
            })
            .await;

        // THEN the user is reported missing
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::NotFound(m) if m == "User not found"));
    }

    #[tokio::test]
    async fn test_grant_zero_credits() {
        let res = memory_logic(&MemoryDatabase::default())
            .oneshot(GrantMembership {
                user_id: Uuid::new_v4(),
                credits_to_add: 0,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_revoke_after_spending_reports_overdraft() -> Result<(), BoxError> {
        // GIVEN a user who spent granted credits on a booking
        let database = MemoryDatabase::default();
        let user = user(&database, "u@example.com").await?;
        let class = database
            .insert_class(ClassSession::create(new_class(3, 6, Duration::days(1)))?)
            .await?;
        let domain = memory_logic(&database);
        let granted = domain
            .clone()
            .oneshot(GrantMembership {
                user_id: user.id,
                credits_to_add: 10,
            })
            .await?;
        domain
            .clone()
            .oneshot(CreateBooking {
                class_id: class.id,
                user_id: user.id,
            })
            .await?;

        // WHEN revoking the membership
        let res = domain
            .oneshot(RevokeMembership {
                membership_id: granted.membership.id,
            })
            .await;

        // THEN the full amount is taken back and the overdraft is reported
        assert_that!(res)
            .is_ok()
            .matches(|revoked| revoked.balance == Some(-6) && revoked.overdrawn);

        Ok(())
    }

    #[tokio::test]
    async fn test_revoke_for_deleted_user() -> Result<(), BoxError> {
        // GIVEN a membership whose user is gone
        let membership = Membership::new(Uuid::new_v4(), 4);
        let membership_id = membership.id;
        let mut memberships = MockMembershipStorePort::new();
        memberships
            .expect_commit_revoke()
            .times(1)
            .with(eq(membership_id))
            .returning(move |_| {
                Ok(MembershipChange {
                    membership: membership.clone(),
                    balance: None,
                })
            });
        let domain = DomainLogic::new(
            Arc::new(MockClassRegistryPort::new()),
            Arc::new(MockUserStorePort::new()),
            Arc::new(MockBookingStorePort::new()),
            Arc::new(memberships),
        );

        // WHEN revoking it
        let res = domain.oneshot(RevokeMembership { membership_id }).await;

        // THEN it succeeds without an overdraft
        assert_that!(res)
            .is_ok()
            .matches(|revoked| revoked.balance.is_none() && !revoked.overdrawn);

        Ok(())
    }

    #[tokio::test]
    async fn test_search_scoped_to_user() -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        let alice = user(&database, "alice@example.com").await?;
        let bob = user(&database, "bob@example.com").await?;
        let domain = memory_logic(&database);
        for user_id in [alice.id, bob.id, bob.id] {
            domain
                .clone()
                .oneshot(GrantMembership {
                    user_id,
                    credits_to_add: 3,
                })
                .await?;
        }

        let as_alice = domain
            .clone()
            .oneshot(SearchMemberships {
                options: SearchOptions::default(),
                actor: Actor {
                    user_id: alice.id,
                    role: Role::User,
                },
            })
            .await?;
        let as_admin = domain
            .oneshot(SearchMemberships {
                options: SearchOptions {
                    search_term: Some("bob@".into()),
                    ..Default::default()
                },
                actor: Actor {
                    user_id: Uuid::new_v4(),
                    role: Role::SuperAdmin,
                },
            })
            .await?;

        assert_that!(as_alice.count).is_equal_to(1);
        assert_that!(as_admin.count).is_equal_to(2);

        Ok(())
    }
}

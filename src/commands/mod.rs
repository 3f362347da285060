use std::{borrow::Cow, future::Future, pin::Pin, sync::Arc};

use uuid::Uuid;

use crate::{
    domain::{booking::RefundPolicy, search::QueryError, user::Role},
    ports::{
        bookings::{self, BookingStorePort},
        classes::{self, ClassRegistryPort},
        memberships::{self, MembershipStorePort},
        users::{self, UserStorePort},
        AdapterError,
    },
};

/// Implement `tower::Service<$request>` for [`DomainLogic`] by delegating to an async method
macro_rules! command {
    ($request:ty => $response:ty, $method:ident) => {
        impl<C, U, B, M> tower::Service<$request> for $crate::commands::DomainLogic<C, U, B, M>
        where
            C: $crate::ports::classes::ClassRegistryPort + ?Sized + 'static,
            U: $crate::ports::users::UserStorePort + ?Sized + 'static,
            B: $crate::ports::bookings::BookingStorePort + ?Sized + 'static,
            M: $crate::ports::memberships::MembershipStorePort + ?Sized + 'static,
        {
            type Response = $response;
            type Error = $crate::commands::Error;
            type Future = $crate::commands::CommandFuture<$response>;

            fn poll_ready(
                &mut self,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<Result<(), Self::Error>> {
                std::task::Poll::Ready(Ok(()))
            }

            fn call(&mut self, req: $request) -> Self::Future {
                let logic = self.clone();
                Box::pin(async move { logic.$method(req).await })
            }
        }
    };
}

pub mod booking_queries;
pub mod cancel_booking;
pub mod classes_admin;
pub mod create_booking;
pub mod memberships_admin;
pub mod users_admin;

pub use booking_queries::{GetBooking, SearchBookings};
pub use cancel_booking::CancelBooking;
pub use classes_admin::{CreateClass, DeleteClass, GetClass, SearchClasses, UpdateClass};
pub use create_booking::CreateBooking;
pub use memberships_admin::{
    GrantMembership, MembershipGranted, MembershipRevoked, RevokeMembership, SearchMemberships,
};
pub use users_admin::{
    ChangePassword, CreditHistory, DeleteUser, EnsureSuperAdmin, GetUser, Login, SearchUsers,
    Signup, UpdateProfile, UpdateUser,
};

pub type CommandFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>;

/// Domain logic wired to the four storage ports
///
/// Every operation is a request type for which this struct implements `tower::Service`.
pub struct DomainLogic<C: ?Sized, U: ?Sized, B: ?Sized, M: ?Sized> {
    classes: Arc<C>,
    users: Arc<U>,
    bookings: Arc<B>,
    memberships: Arc<M>,
    refund_policy: RefundPolicy,
}

/// Domain logic over type-erased ports, as held by the HTTP layer
pub type SharedLogic = DomainLogic<
    dyn ClassRegistryPort,
    dyn UserStorePort,
    dyn BookingStorePort,
    dyn MembershipStorePort,
>;

impl<C: ?Sized, U: ?Sized, B: ?Sized, M: ?Sized> DomainLogic<C, U, B, M> {
    pub fn new(classes: Arc<C>, users: Arc<U>, bookings: Arc<B>, memberships: Arc<M>) -> Self {
        Self {
            classes,
            users,
            bookings,
            memberships,
            refund_policy: RefundPolicy::default(),
        }
    }

    pub fn with_refund_policy(mut self, refund_policy: RefundPolicy) -> Self {
        self.refund_policy = refund_policy;
        self
    }
}

impl SharedLogic {
    /// Use a single store for every port
    pub fn shared<D>(database: Arc<D>) -> Self
    where
        D: ClassRegistryPort + UserStorePort + BookingStorePort + MembershipStorePort + 'static,
    {
        Self::new(
            database.clone(),
            database.clone(),
            database.clone(),
            database,
        )
    }
}

impl<C: ?Sized, U: ?Sized, B: ?Sized, M: ?Sized> Clone for DomainLogic<C, U, B, M> {
    fn clone(&self) -> Self {
        Self {
            classes: self.classes.clone(),
            users: self.users.clone(),
            bookings: self.bookings.clone(),
            memberships: self.memberships.clone(),
            refund_policy: self.refund_policy,
        }
    }
}

/// Authenticated caller of an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    pub fn require_admin(&self) -> Result<(), Error> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden("Insufficient permissions".into()))
        }
    }

    /// Owner restriction to apply on searches, `None` for administrators
    pub fn scope(&self) -> Option<Uuid> {
        (!self.is_admin()).then_some(self.user_id)
    }
}

/// Error returned by every command
///
/// The message of each business variant is meant for the API caller as is.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    NotFound(Cow<'static, str>),
    #[error("{0}")]
    InvalidRequest(Cow<'static, str>),
    #[error("{0}")]
    Conflict(Cow<'static, str>),
    #[error("{0}")]
    Unauthorized(Cow<'static, str>),
    #[error("{0}")]
    Forbidden(Cow<'static, str>),

    #[error("adapter error: {0:?}")]
    Adapter(AdapterError),
}

impl From<classes::Error> for Error {
    fn from(err: classes::Error) -> Self {
        match err {
            e @ classes::Error::ClassNotFound(_) => Error::NotFound(e.to_string().into()),
            e @ (classes::Error::Invalid(_) | classes::Error::HasActiveBookings(_)) => {
                Error::InvalidRequest(e.to_string().into())
            }
            classes::Error::Adapter(err) => Error::Adapter(err),
        }
    }
}

impl From<users::Error> for Error {
    fn from(err: users::Error) -> Self {
        match err {
            e @ users::Error::UserNotFound(_) => Error::NotFound(e.to_string().into()),
            e @ users::Error::EmailTaken(_) => Error::Conflict(e.to_string().into()),
            users::Error::Adapter(err) => Error::Adapter(err),
        }
    }
}

impl From<bookings::Error> for Error {
    fn from(err: bookings::Error) -> Self {
        use bookings::Error::*;

        match err {
            e @ (BookingNotFound(_) | ClassNotFound(_) | UserNotFound(_)) => {
                Error::NotFound(e.to_string().into())
            }
            e @ (ClassFull(_)
            | AlreadyBooked { .. }
            | OverlappingBooking { .. }
            | InsufficientCredits { .. }
            | AlreadyCancelled(_)) => Error::InvalidRequest(e.to_string().into()),
            Adapter(err) => Error::Adapter(err),
        }
    }
}

impl From<memberships::Error> for Error {
    fn from(err: memberships::Error) -> Self {
        match err {
            e @ (memberships::Error::MembershipNotFound(_) | memberships::Error::UserNotFound(_)) => {
                Error::NotFound(e.to_string().into())
            }
            memberships::Error::Adapter(err) => Error::Adapter(err),
        }
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::InvalidRequest(err.to_string().into())
    }
}

use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{self, AuthError},
    domain::{
        credit::CreditEvent,
        search::{Page, Query, SearchOptions},
        user::{is_strong_password, is_valid_email, normalize_email, Role, User, UserField},
    },
    ports::{
        bookings::BookingStorePort, classes::ClassRegistryPort,
        memberships::MembershipStorePort, users::{self, UserStorePort},
    },
};

use super::{DomainLogic, Error};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const WEAK_PASSWORD: &str =
    "Password must have at least 8 characters with lowercase, uppercase, digit and symbol";

/// Register a new `USER` account with no credits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signup {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetUser {
    pub user_id: Uuid,
}

/// Self-service edit of name and email
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    #[serde(skip)]
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Administrator edit of any account
///
/// Credits are not part of it: they only move through bookings and memberships.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    #[serde(skip)]
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePassword {
    #[serde(skip)]
    pub user_id: Uuid,
    pub old_password: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteUser {
    pub user_id: Uuid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchUsers {
    pub options: SearchOptions,
}

/// Credit ledger of a user, oldest first
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreditHistory {
    pub user_id: Uuid,
}

/// Create the configured administrator unless an account with that email exists
///
/// Responds with `true` when an account was created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnsureSuperAdmin {
    pub email: String,
    pub name: String,
    pub password: String,
}

command!(Signup => User, signup);
command!(Login => User, login);
command!(GetUser => User, get_user);
command!(UpdateProfile => User, update_profile);
command!(UpdateUser => User, update_user);
command!(ChangePassword => (), change_password);
command!(DeleteUser => (), delete_user);
command!(SearchUsers => Page<User>, search_users);
command!(CreditHistory => Vec<CreditEvent>, credit_history);
command!(EnsureSuperAdmin => bool, ensure_super_admin);

impl<C, U, B, M> DomainLogic<C, U, B, M>
where
    C: ClassRegistryPort + ?Sized,
    U: UserStorePort + ?Sized,
    B: BookingStorePort + ?Sized,
    M: MembershipStorePort + ?Sized,
{
    async fn signup(&self, req: Signup) -> Result<User, Error> {
        let email = valid_email(&req.email)?;
        let name = valid_name(&req.name)?;
        if !is_strong_password(&req.password) {
            return Err(Error::InvalidRequest(WEAK_PASSWORD.into()));
        }
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(users::Error::EmailTaken(email).into());
        }

        let password_hash = auth::hash_password(&req.password)?;
        let user = self
            .users
            .insert_user(User::new(&email, &name, password_hash, Role::User))
            .await?;

        tracing::info!(user_id = %user.id, "user signed up");
        Ok(user)
    }

    async fn login(&self, req: Login) -> Result<User, Error> {
        let user = self
            .users
            .find_user_by_email(&normalize_email(&req.email))
            .await?
            .ok_or(Error::Unauthorized(INVALID_CREDENTIALS.into()))?;

        if !auth::verify_password(&req.password, &user.password_hash) {
            return Err(Error::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        Ok(user)
    }

    async fn get_user(&self, req: GetUser) -> Result<User, Error> {
        Ok(self.users.get_user(req.user_id).await?)
    }

    async fn update_profile(&self, req: UpdateProfile) -> Result<User, Error> {
        self.update_user(UpdateUser {
            user_id: req.user_id,
            name: req.name,
            email: req.email,
            ..Default::default()
        })
        .await
    }

    async fn update_user(&self, req: UpdateUser) -> Result<User, Error> {
        let mut user = self.users.get_user(req.user_id).await?;

        if let Some(name) = req.name {
            user.name = valid_name(&name)?;
        }
        if let Some(email) = req.email {
            user.email = valid_email(&email)?;
        }
        if let Some(role) = req.role {
            user.role = role;
        }
        if let Some(password) = req.password {
            if !is_strong_password(&password) {
                return Err(Error::InvalidRequest(WEAK_PASSWORD.into()));
            }
            user.password_hash = auth::hash_password(&password)?;
        }

        Ok(self.users.update_profile(user).await?)
    }

    async fn change_password(&self, req: ChangePassword) -> Result<(), Error> {
        let mut user = self.users.get_user(req.user_id).await?;
        if !auth::verify_password(&req.old_password, &user.password_hash) {
            return Err(Error::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        if req.password != req.confirm_password {
            return Err(Error::InvalidRequest("Passwords do not match".into()));
        }
        if !is_strong_password(&req.password) {
            return Err(Error::InvalidRequest(WEAK_PASSWORD.into()));
        }

        user.password_hash = auth::hash_password(&req.password)?;
        self.users.update_profile(user).await?;
        Ok(())
    }

    async fn delete_user(&self, req: DeleteUser) -> Result<(), Error> {
        self.users.delete_user(req.user_id).await?;

        tracing::info!(user_id = %req.user_id, "user deleted");
        Ok(())
    }

    async fn search_users(&self, req: SearchUsers) -> Result<Page<User>, Error> {
        let query = Query::<UserField>::from_options(req.options)?;
        Ok(self.users.search_users(query).await?)
    }

    async fn credit_history(&self, req: CreditHistory) -> Result<Vec<CreditEvent>, Error> {
        Ok(self.users.credit_history(req.user_id).await?)
    }

    async fn ensure_super_admin(&self, req: EnsureSuperAdmin) -> Result<bool, Error> {
        let email = valid_email(&req.email)?;
        if self.users.find_user_by_email(&email).await?.is_some() {
            tracing::debug!(%email, "super admin already present");
            return Ok(false);
        }

        let password_hash = auth::hash_password(&req.password)?;
        let admin = self
            .users
            .insert_user(User::new(&email, &req.name, password_hash, Role::SuperAdmin))
            .await?;

        tracing::info!(user_id = %admin.id, %email, "super admin created");
        Ok(true)
    }
}

fn valid_email(email: &str) -> Result<String, Error> {
    let email = normalize_email(email);
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(Error::InvalidRequest("Email must be a valid email address".into()))
    }
}

fn valid_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        Err(Error::InvalidRequest("Name must not be empty".into()))
    } else {
        Ok(name.to_string())
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Adapter(Box::new(err))
    }
}

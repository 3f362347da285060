//! Password hashing and access tokens

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::{Role, User};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("token expiration out of range")]
    Expiration,

    #[error("invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

/// Whether `password` matches the stored hash
///
/// A hash that cannot be parsed never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::warn!(error = %err, "stored password hash is not parseable");
            false
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

/// Issues and verifies HS256 access tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, lifetime_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::seconds(
                i64::try_from(lifetime_seconds)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let exp = Utc::now()
            .checked_add_signed(self.lifetime)
            .ok_or(AuthError::Expiration)?
            .timestamp()
            .max(0) as usize;
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            exp,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(decode::<Claims>(token, &self.decoding, &Validation::default())?.claims)
    }
}

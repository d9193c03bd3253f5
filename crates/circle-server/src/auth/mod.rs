//! Authentication module.
//!
//! - [`UserStore`]: registered users in libSQL, also the hub's recipient directory
//! - [`password`]: Argon2id hashing and verification
//! - [`TokenIssuer`]: HS256 access tokens presented on the WebSocket upgrade

pub mod password;
pub mod token;
pub mod users;

use thiserror::Error;

use crate::db::DatabaseError;

pub use token::{Claims, TokenIssuer};
pub use users::{User, UserStore};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Authentication-related errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Incorrect password")]
    WrongPassword,

    #[error("Missing access token")]
    MissingToken,

    #[error("Access token expired")]
    TokenExpired,

    #[error("JWT validation failed: {0}")]
    JwtError(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::JwtError(err.to_string()),
        }
    }
}

impl From<DatabaseError> for AuthError {
    fn from(err: DatabaseError) -> Self {
        AuthError::DatabaseError(err.to_string())
    }
}

impl From<libsql::Error> for AuthError {
    fn from(err: libsql::Error) -> Self {
        AuthError::DatabaseError(err.to_string())
    }
}

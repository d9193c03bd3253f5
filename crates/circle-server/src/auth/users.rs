//! Registered users.
//!
//! Emails are trimmed and lowercased before they are stored or looked up, so
//! `Alice@X.com` and `alice@x.com` are the same account.

use std::future::Future;
use std::sync::Arc;

use circle_hub::{envelope::is_email, HubError, IdentityLookup, UserId};
use serde::Serialize;
use tracing::{debug, instrument};

use super::{password, AuthError, MIN_PASSWORD_LEN};
use crate::db::Database;

/// User record from the database.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Database ID
    pub id: i64,
    /// Normalized email address
    pub email: String,
    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Creation timestamp
    pub created_at: String,
}

/// User store backed by libSQL.
#[derive(Clone)]
pub struct UserStore {
    db: Arc<Database>,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a new user.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn create(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);
        if !is_email(&email) {
            return Err(AuthError::InvalidEmail(email));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidPassword(format!(
                "must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        if self.find_by_email(&email).await?.is_some() {
            return Err(AuthError::UserAlreadyExists(email));
        }

        let password_hash = password::hash_password(password)?;

        let conn = self.db.connection().await?;
        conn.execute(
            "INSERT INTO users (email, password_hash) VALUES (?, ?)",
            (email.as_str(), password_hash.as_str()),
        )
        .await
        .map_err(|e| {
            // Lost a race with a concurrent signup for the same address.
            if is_constraint_violation(&e) {
                AuthError::UserAlreadyExists(email.clone())
            } else {
                AuthError::DatabaseError(e.to_string())
            }
        })?;
        let id = conn.last_insert_rowid();
        drop(conn);

        debug!(user_id = id, "User registered");

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::DatabaseError(format!("user {} vanished after insert", id)))
    }

    /// Find a user by email address.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let email = normalize_email(email);
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "SELECT id, email, password_hash, created_at FROM users WHERE email = ?",
                [email.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, AuthError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "SELECT id, email, password_hash, created_at FROM users WHERE id = ?",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Check an email/password pair, returning the user on success.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(normalize_email(email)))?;

        if password::verify_password(password, &user.password_hash)? {
            Ok(user)
        } else {
            Err(AuthError::WrongPassword)
        }
    }
}

impl IdentityLookup for UserStore {
    fn resolve_recipient(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<UserId>, HubError>> + Send {
        async move {
            self.find_by_email(address)
                .await
                .map(|user| user.map(|u| UserId(u.id)))
                .map_err(|e| HubError::lookup(e.to_string()))
        }
    }
}

/// SQLite primary result code for constraint failures. Extended codes such as
/// `SQLITE_CONSTRAINT_UNIQUE` (2067) carry it in the low byte.
const SQLITE_CONSTRAINT: i32 = 19;

/// Whether the insert failed on a table constraint. `email` is the only one
/// an insert into `users` can hit.
fn is_constraint_violation(err: &libsql::Error) -> bool {
    matches!(err, libsql::Error::SqliteFailure(code, _) if code & 0xff == SQLITE_CONSTRAINT)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn user_from_row(row: &libsql::Row) -> Result<User, AuthError> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

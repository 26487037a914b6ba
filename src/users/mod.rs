//! Credential store: one `users` row per registered email.
//!
//! Rows are created on registration and never updated or deleted. Lookups are
//! exact matches on the (already normalized) email.

mod postgres;
pub use self::postgres::{PgUserStore, USERS_TABLE_SQL};

#[cfg(test)]
mod memory;
#[cfg(test)]
pub use self::memory::MemoryUserStore;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// A stored user; `password_hash` is a PHC string.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user already exists")]
    Duplicate,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync + fmt::Debug {
    /// Exact-match lookup by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Insert a new user, `StoreError::Duplicate` if the email is taken.
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    /// Liveness check used by `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}

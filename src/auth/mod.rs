//! Registration, login and session verification.
//!
//! `Authenticator` ties the credential store to password hashing and session
//! tokens. Unknown emails and wrong passwords both surface as
//! `AuthError::InvalidCredentials` so callers cannot tell them apart.

pub mod password;
pub mod session;

pub use self::session::{SessionClaims, SessionKeys, SESSION_TTL_SECONDS};

use crate::users::{StoreError, User, UserStore};
use regex::Regex;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, instrument};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    DuplicateUser,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error(transparent)]
    Store(StoreError),
    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => Self::DuplicateUser,
            other @ StoreError::Database(_) => Self::Store(other),
        }
    }
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Lightweight email sanity check used before touching the store.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

pub struct Authenticator {
    store: Arc<dyn UserStore>,
    sessions: SessionKeys,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>, sessions: SessionKeys) -> Self {
        Self { store, sessions }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Create a user and return a session token for it.
    ///
    /// # Errors
    /// `DuplicateUser` if the email is already registered, `Store`/`Internal`
    /// if persisting or hashing fails.
    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<String, AuthError> {
        if self.store.find_by_email(email).await?.is_some() {
            debug!("email already registered");
            return Err(AuthError::DuplicateUser);
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("password hashing task failed: {e}")))?
            .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?;

        let user = self.store.create(email, &password_hash).await?;

        debug!(user_id = user.id, "user registered");

        self.issue(user.id, &user.email)
    }

    /// Check credentials and return a session token.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown email or a wrong password.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let Some(user) = self.find_user(email).await? else {
            debug!("unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let password = password.to_string();
        let stored_hash = user.password_hash.clone();
        let matches =
            tokio::task::spawn_blocking(move || password::verify_password(&password, &stored_hash))
                .await
                .map_err(|e| AuthError::Internal(format!("password check task failed: {e}")))?;

        match matches {
            Ok(true) => self.issue(user.id, &user.email),
            Ok(false) => {
                debug!(user_id = user.id, "password mismatch");
                Err(AuthError::InvalidCredentials)
            }
            Err(e) => {
                // A corrupt stored hash can never match; treat it like a mismatch.
                error!(user_id = user.id, "stored password hash is unreadable: {e}");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Exact match first so rows stored with mixed case stay reachable, then
    /// the normalized form new registrations use.
    async fn find_user(&self, email: &str) -> Result<Option<User>, AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(None);
        }

        if let Some(user) = self.store.find_by_email(email).await? {
            return Ok(Some(user));
        }

        let normalized = normalize_email(email);
        if normalized == email {
            return Ok(None);
        }

        Ok(self.store.find_by_email(&normalized).await?)
    }

    /// Validate a session token.
    ///
    /// # Errors
    /// `InvalidToken` on a bad signature, malformed token or expiry.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        self.sessions.validate(token).map_err(|e| {
            debug!("session token rejected: {e}");
            AuthError::InvalidToken
        })
    }

    fn issue(&self, id: i32, email: &str) -> Result<String, AuthError> {
        self.sessions
            .issue(id, email)
            .map_err(|e| AuthError::Internal(format!("failed to sign session token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::MemoryUserStore;

    fn authenticator() -> Authenticator {
        Authenticator::new(
            Arc::new(MemoryUserStore::default()),
            SessionKeys::new(b"authenticator-test-secret"),
        )
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_simple() {
        assert!(valid_email("user@example.com"));
        assert!(!valid_email("user.example.com"));
        assert!(!valid_email("user@localhost"));
    }

    #[tokio::test]
    async fn register_twice_is_duplicate() -> anyhow::Result<()> {
        let auth = authenticator();
        auth.register("a@example.com", "first").await?;

        let second = auth.register("a@example.com", "something else").await;
        assert!(matches!(second, Err(AuthError::DuplicateUser)));
        Ok(())
    }

    #[tokio::test]
    async fn register_token_verifies() -> anyhow::Result<()> {
        let auth = authenticator();
        let token = auth.register("a@example.com", "secret").await?;

        let claims = auth.verify(&token)?;
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.id, 1);
        Ok(())
    }

    #[tokio::test]
    async fn login_with_correct_password() -> anyhow::Result<()> {
        let auth = authenticator();
        auth.register("a@example.com", "secret").await?;

        let token = auth.login("a@example.com", "secret").await?;
        assert_eq!(auth.verify(&token)?.email, "a@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() -> anyhow::Result<()> {
        let auth = authenticator();
        auth.register("a@example.com", "secret").await?;

        let wrong_password = auth.login("a@example.com", "nope").await;
        let unknown_email = auth.login("b@example.com", "secret").await;

        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(AuthError::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn login_ignores_email_case_and_whitespace() -> anyhow::Result<()> {
        let auth = authenticator();
        auth.register("a@example.com", "secret").await?;

        let token = auth.login(" A@Example.com ", "secret").await?;
        assert_eq!(auth.verify(&token)?.email, "a@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn login_finds_mixed_case_rows_exactly() -> anyhow::Result<()> {
        let store = Arc::new(MemoryUserStore::default());
        let hash = password::hash_password("secret")?;
        store.create("Legacy@Example.com", &hash).await?;

        let auth = Authenticator::new(store, SessionKeys::new(b"authenticator-test-secret"));
        let token = auth.login("Legacy@Example.com", "secret").await?;
        assert_eq!(auth.verify(&token)?.email, "Legacy@Example.com");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_login_input_is_invalid_credentials() -> anyhow::Result<()> {
        let auth = authenticator();
        auth.register("a@example.com", "secret").await?;

        for (email, password) in [("bob@localhost", "secret"), ("a@example.com", ""), ("", "")] {
            assert!(matches!(
                auth.login(email, password).await,
                Err(AuthError::InvalidCredentials)
            ));
        }
        Ok(())
    }

    #[test]
    fn verify_rejects_foreign_token() {
        let auth = authenticator();
        let foreign = SessionKeys::new(b"someone-else");
        let token = foreign.issue(1, "a@example.com");
        assert!(token.is_ok());
        if let Ok(token) = token {
            assert!(matches!(auth.verify(&token), Err(AuthError::InvalidToken)));
        }
    }
}

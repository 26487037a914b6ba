use super::{StoreError, User, UserStore};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::{debug, info_span, instrument, Instrument};

pub const USERS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    email TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL
)";

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `users` table if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        sqlx::query(USERS_TABLE_SQL).execute(&self.pool).await?;

        debug!("users table ready");

        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, email, password FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    #[instrument(skip(self, password_hash))]
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        match sqlx::query(
            "INSERT INTO users (email, password) VALUES ($1, $2) RETURNING id, email, password",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        {
            Ok(row) => Ok(user_from_row(&row)?),
            // Lost a race against a concurrent registration of the same email.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;

        Ok(())
    }
}

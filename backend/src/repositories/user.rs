//! User directory: lookups and CRUD over stored users

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use user_management_shared::UserResponse;
use uuid::Uuid;

/// User record including the stored credential
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Input for creating a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
}

/// A write collided with another user's username or email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unique constraint violated on users.{column}")]
pub struct UniqueViolation {
    /// `"username"` or `"email"`
    pub column: &'static str,
}

/// Storage-agnostic user directory
///
/// The authentication service only ever calls the `get_by_*` lookups.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn create(&self, new_user: NewUser) -> Result<UserRecord>;

    /// Persist every mutable field of `user`; `None` if it no longer exists
    async fn update(&self, user: &UserRecord) -> Result<Option<UserRecord>>;

    /// Swap the stored credential only if it still equals `current_hash`
    ///
    /// Returns `false` when the user is gone or the credential changed
    /// since it was read. No other field is touched.
    async fn update_password_hash(
        &self,
        id: Uuid,
        current_hash: &str,
        new_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// One page ordered by creation time, plus the total row count
    async fn list(&self, skip: i64, limit: i64) -> Result<(Vec<UserRecord>, i64)>;
}

const USER_COLUMNS: &str = "id, username, email, hashed_password, is_active, created_at, updated_at";

/// PostgreSQL-backed user directory
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }
}

/// Turn a unique-index violation into [`UniqueViolation`]
fn map_write_error(err: sqlx::Error) -> anyhow::Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let column = match db_err.constraint() {
                Some(constraint) if constraint.contains("email") => "email",
                _ => "username",
            };
            return UniqueViolation { column }.into();
        }
    }
    err.into()
}

#[async_trait]
impl UserDirectory for PgUserRepository {
    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        self.find_one("username", username).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.find_one("email", email).await
    }

    async fn create(&self, new_user: NewUser) -> Result<UserRecord> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (username, email, hashed_password)
            VALUES ($1, $2, $3)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(user)
    }

    async fn update(&self, user: &UserRecord) -> Result<Option<UserRecord>> {
        let updated = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE users SET
                username = $2,
                email = $3,
                hashed_password = $4,
                is_active = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(user.is_active)
        .bind(user.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(updated)
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        current_hash: &str,
        new_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET hashed_password = $3, updated_at = $4
            WHERE id = $1 AND hashed_password = $2
            "#,
        )
        .bind(id)
        .bind(current_hash)
        .bind(new_hash)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<(Vec<UserRecord>, i64)> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let users = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            SELECT {}
            FROM users
            ORDER BY created_at, id
            OFFSET $1
            LIMIT $2
            "#,
            USER_COLUMNS
        ))
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok((users, total))
    }
}

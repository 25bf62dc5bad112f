//! Append-only log of authentication attempts
//!
//! Records are written once, at the moment of an authentication decision,
//! and never updated or deleted. The log also answers "how many recent
//! failures" for lockout reporting.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Stored authentication attempt
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthAttemptRecord {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub success: bool,
    #[sqlx(rename = "attempted_at")]
    pub timestamp: DateTime<Utc>,
    pub details: Option<String>,
}

/// Attempt to append; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthAttempt {
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub success: bool,
    pub details: Option<String>,
}

#[async_trait]
pub trait AuthLogStore: Send + Sync {
    async fn append(&self, attempt: NewAuthAttempt) -> Result<()>;

    /// Failed attempts within the last `window_minutes`
    ///
    /// Filters by user when given, otherwise by ip. With neither, 0.
    async fn count_recent_failures(
        &self,
        user_id: Option<Uuid>,
        ip_address: Option<&str>,
        window_minutes: i64,
    ) -> Result<i64>;
}

/// PostgreSQL-backed auth log
#[derive(Clone)]
pub struct PgAuthLogRepository {
    pool: PgPool,
}

impl PgAuthLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthLogStore for PgAuthLogRepository {
    async fn append(&self, attempt: NewAuthAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_logs (user_id, ip_address, success, details)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(attempt.user_id)
        .bind(attempt.ip_address)
        .bind(attempt.success)
        .bind(attempt.details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_recent_failures(
        &self,
        user_id: Option<Uuid>,
        ip_address: Option<&str>,
        window_minutes: i64,
    ) -> Result<i64> {
        let window = window_minutes as f64;

        let count = match (user_id, ip_address) {
            (Some(user_id), _) => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COUNT(*) FROM auth_logs
                    WHERE success = FALSE
                      AND user_id = $1
                      AND attempted_at >= NOW() - ($2::double precision * INTERVAL '1 minute')
                    "#,
                )
                .bind(user_id)
                .bind(window)
                .fetch_one(&self.pool)
                .await?
            }
            (None, Some(ip)) => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COUNT(*) FROM auth_logs
                    WHERE success = FALSE
                      AND ip_address = $1
                      AND attempted_at >= NOW() - ($2::double precision * INTERVAL '1 minute')
                    "#,
                )
                .bind(ip)
                .bind(window)
                .fetch_one(&self.pool)
                .await?
            }
            (None, None) => 0,
        };

        Ok(count)
    }
}

/// Auth log used when logging is disabled: accepts and forgets everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuthLogStore;

#[async_trait]
impl AuthLogStore for NoopAuthLogStore {
    async fn append(&self, _attempt: NewAuthAttempt) -> Result<()> {
        Ok(())
    }

    async fn count_recent_failures(
        &self,
        _user_id: Option<Uuid>,
        _ip_address: Option<&str>,
        _window_minutes: i64,
    ) -> Result<i64> {
        Ok(0)
    }
}

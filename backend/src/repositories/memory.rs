//! In-memory stores
//!
//! Used by tests and by embedders that don't want a database. Semantics
//! match the PostgreSQL repositories, including unique usernames and emails.

use super::auth_log::{AuthAttemptRecord, AuthLogStore, NewAuthAttempt};
use super::user::{NewUser, UniqueViolation, UserDirectory, UserRecord};
use crate::clock::{system_clock, SharedClock};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

/// User directory kept in a vector, in creation order
pub struct InMemoryUserDirectory {
    users: RwLock<Vec<UserRecord>>,
    clock: SharedClock,
}

impl Default for InMemoryUserDirectory {
    fn default() -> Self {
        Self::new(system_clock())
    }
}

impl InMemoryUserDirectory {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            users: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Insert a fully formed record, bypassing uniqueness checks
    pub fn insert(&self, user: UserRecord) {
        self.users.write().push(user);
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    fn conflicts(users: &[UserRecord], id: Uuid, username: &str, email: &str) -> Option<&'static str> {
        users.iter().filter(|u| u.id != id).find_map(|u| {
            if u.username == username {
                Some("username")
            } else if u.email == email {
                Some("email")
            } else {
                None
            }
        })
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().iter().find(|u| u.username == username).cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.users.read().iter().find(|u| u.id == id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().iter().find(|u| u.email == email).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<UserRecord> {
        let mut users = self.users.write();
        let id = Uuid::new_v4();
        if let Some(column) = Self::conflicts(&users, id, &new_user.username, &new_user.email) {
            return Err(UniqueViolation { column }.into());
        }

        let now = self.clock.now();
        let user = UserRecord {
            id,
            username: new_user.username,
            email: new_user.email,
            hashed_password: new_user.hashed_password,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update(&self, user: &UserRecord) -> Result<Option<UserRecord>> {
        let mut users = self.users.write();
        if let Some(column) = Self::conflicts(&users, user.id, &user.username, &user.email) {
            return Err(UniqueViolation { column }.into());
        }

        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(Some(existing.clone()))
            }
            None => Ok(None),
        }
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        current_hash: &str,
        new_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut users = self.users.write();
        match users
            .iter_mut()
            .find(|u| u.id == id && u.hashed_password == current_hash)
        {
            Some(user) => {
                user.hashed_password = new_hash.to_string();
                user.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut users = self.users.write();
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<(Vec<UserRecord>, i64)> {
        let users = self.users.read();
        let page = users
            .iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, users.len() as i64))
    }
}

/// Auth log kept in memory, timestamped by the injected clock
pub struct InMemoryAuthLogStore {
    records: Mutex<Vec<AuthAttemptRecord>>,
    clock: SharedClock,
}

impl Default for InMemoryAuthLogStore {
    fn default() -> Self {
        Self::new(system_clock())
    }
}

impl InMemoryAuthLogStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Snapshot of every appended record, oldest first
    pub fn records(&self) -> Vec<AuthAttemptRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuthLogStore for InMemoryAuthLogStore {
    async fn append(&self, attempt: NewAuthAttempt) -> Result<()> {
        let mut records = self.records.lock();
        let id = records.len() as i64 + 1;
        records.push(AuthAttemptRecord {
            id,
            user_id: attempt.user_id,
            ip_address: attempt.ip_address,
            success: attempt.success,
            timestamp: self.clock.now(),
            details: attempt.details,
        });
        Ok(())
    }

    async fn count_recent_failures(
        &self,
        user_id: Option<Uuid>,
        ip_address: Option<&str>,
        window_minutes: i64,
    ) -> Result<i64> {
        let cutoff = self.clock.now() - Duration::minutes(window_minutes);
        let records = self.records.lock();
        let recent_failures = records.iter().filter(|r| !r.success && r.timestamp >= cutoff);

        let count = match (user_id, ip_address) {
            (Some(user_id), _) => recent_failures.filter(|r| r.user_id == Some(user_id)).count(),
            (None, Some(ip)) => recent_failures
                .filter(|r| r.ip_address.as_deref() == Some(ip))
                .count(),
            (None, None) => 0,
        };

        Ok(count as i64)
    }
}

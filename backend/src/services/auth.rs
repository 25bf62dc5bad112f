//! Authentication service
//!
//! Composes the user directory, the password hasher, the token issuer and
//! the auth log into a single `authenticate` operation. Every call appends
//! exactly one record to the auth log, whichever way it ends.
//!
//! The service only reads from the directory. Credential upgrades after a
//! successful login are the caller's business (see [`Authenticated::needs_rehash`]).

use crate::auth::{AccessToken, JwtService, PasswordService};
use crate::config::LockoutConfig;
use crate::repositories::{AuthLogStore, NewAuthAttempt, UserDirectory};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use user_management_shared::AuthError;
use uuid::Uuid;

const DETAIL_USER_NOT_FOUND: &str = "user not found";
const DETAIL_INVALID_PASSWORD: &str = "invalid password";
const DETAIL_DIRECTORY_UNAVAILABLE: &str = "user directory unavailable";
const DETAIL_VERIFICATION_FAILED: &str = "password verification failed";
const DETAIL_TOKEN_ISSUE_FAILED: &str = "token issue failed";

/// Plaintext behind the stand-in credential checked for unknown usernames
const UNKNOWN_USER_PASSWORD: &str = "unknown-user-placeholder";

/// Successful authentication
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user_id: Uuid,
    pub token: AccessToken,
    /// Stored credential uses an outdated algorithm or cost
    pub needs_rehash: bool,
}

/// Result of the lockout check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    /// Too many recent failures. Reported only; login is not blocked.
    Locked { failed_attempts: i64 },
}

impl AccountStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, AccountStatus::Locked { .. })
    }
}

/// Authentication service
///
/// Cloning is cheap: stores are shared trait objects and the hasher and
/// token service are internally Arc'd.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    auth_log: Arc<dyn AuthLogStore>,
    passwords: PasswordService,
    tokens: JwtService,
    lockout: LockoutConfig,
    /// Argon2id credential at current cost, verified against for unknown users
    unknown_user_hash: Arc<str>,
}

impl AuthService {
    /// Build the service, hashing the unknown-user credential once
    pub fn new(
        users: Arc<dyn UserDirectory>,
        auth_log: Arc<dyn AuthLogStore>,
        passwords: PasswordService,
        tokens: JwtService,
        lockout: LockoutConfig,
    ) -> anyhow::Result<Self> {
        let unknown_user_hash: Arc<str> = passwords.hash(UNKNOWN_USER_PASSWORD)?.into();

        Ok(Self {
            users,
            auth_log,
            passwords,
            tokens,
            lockout,
            unknown_user_hash,
        })
    }

    /// Authenticate a username/password pair
    ///
    /// Unknown users and wrong passwords are both `Ok(None)`; callers must
    /// not tell them apart in responses. `Err` is reserved for faults.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        client_ip: Option<&str>,
    ) -> Result<Option<Authenticated>, AuthError> {
        let user = match self.users.get_by_username(username).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "User lookup failed during authentication");
                counter!("auth_attempts_total", "outcome" => "error").increment(1);
                // The directory fault is what the caller needs to see
                let _ = self
                    .record(None, client_ip, false, DETAIL_DIRECTORY_UNAVAILABLE)
                    .await;
                return Err(AuthError::StorageUnavailable(e.to_string()));
            }
        };

        let Some(user) = user else {
            // Same verification cost as a known user with a wrong password
            let _ = self
                .passwords
                .verify_async(password.to_string(), self.unknown_user_hash.to_string())
                .await;
            debug!(client_ip = ?client_ip, "Login attempt for unknown user");
            self.record(None, client_ip, false, DETAIL_USER_NOT_FOUND).await?;
            counter!("auth_attempts_total", "outcome" => "unknown_user").increment(1);
            return Ok(None);
        };

        let verified = match self
            .passwords
            .verify_async(password.to_string(), user.hashed_password.clone())
            .await
        {
            Ok(verified) => verified,
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Password verification failed to run");
                counter!("auth_attempts_total", "outcome" => "error").increment(1);
                let _ = self
                    .record(Some(user.id), client_ip, false, DETAIL_VERIFICATION_FAILED)
                    .await;
                return Err(e);
            }
        };

        if !verified {
            info!(user_id = %user.id, client_ip = ?client_ip, "Login failed: invalid password");
            self.record(Some(user.id), client_ip, false, DETAIL_INVALID_PASSWORD)
                .await?;
            counter!("auth_attempts_total", "outcome" => "invalid_password").increment(1);
            return Ok(None);
        }

        let token = match self.tokens.issue_access_token(user.id) {
            Ok(token) => token,
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Failed to issue access token");
                counter!("auth_attempts_total", "outcome" => "error").increment(1);
                let _ = self
                    .record(Some(user.id), client_ip, false, DETAIL_TOKEN_ISSUE_FAILED)
                    .await;
                return Err(e.into());
            }
        };

        self.record(Some(user.id), client_ip, true, "").await?;
        counter!("auth_attempts_total", "outcome" => "success").increment(1);
        info!(user_id = %user.id, "User authenticated");

        Ok(Some(Authenticated {
            user_id: user.id,
            token,
            needs_rehash: self.passwords.needs_rehash(&user.hashed_password),
        }))
    }

    /// Failed attempts in the last `window_minutes`, by user, else by ip
    pub async fn recent_failed_attempts(
        &self,
        user_id: Option<Uuid>,
        ip_address: Option<&str>,
        window_minutes: i64,
    ) -> Result<i64, AuthError> {
        self.auth_log
            .count_recent_failures(user_id, ip_address, window_minutes)
            .await
            .map_err(|e| AuthError::AuthLogUnavailable(e.to_string()))
    }

    /// Compare recent failures for `username` against the lockout threshold
    ///
    /// Unknown usernames report `Active`.
    pub async fn check_account_status(&self, username: &str) -> Result<AccountStatus, AuthError> {
        let Some(user) = self
            .users
            .get_by_username(username)
            .await
            .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?
        else {
            return Ok(AccountStatus::Active);
        };

        let failed_attempts = self
            .recent_failed_attempts(Some(user.id), None, self.lockout.window_minutes)
            .await?;

        if failed_attempts >= self.lockout.max_failed_attempts {
            Ok(AccountStatus::Locked { failed_attempts })
        } else {
            Ok(AccountStatus::Active)
        }
    }

    async fn record(
        &self,
        user_id: Option<Uuid>,
        client_ip: Option<&str>,
        success: bool,
        details: &str,
    ) -> Result<(), AuthError> {
        let attempt = NewAuthAttempt {
            user_id,
            ip_address: client_ip.map(str::to_string),
            success,
            details: (!details.is_empty()).then(|| details.to_string()),
        };

        self.auth_log.append(attempt).await.map_err(|e| {
            warn!(error = %e, "Failed to append auth log record");
            counter!("auth_log_append_failures_total").increment(1);
            AuthError::AuthLogUnavailable(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SharedClock};
    use crate::repositories::{InMemoryAuthLogStore, InMemoryUserDirectory, NewUser, UserRecord};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use fake::faker::internet::en::{SafeEmail, Username};
    use fake::Fake;
    use secrecy::SecretString;

    const PASSWORD: &str = "correct horse battery";

    struct Harness {
        service: AuthService,
        users: Arc<InMemoryUserDirectory>,
        log: Arc<InMemoryAuthLogStore>,
        passwords: PasswordService,
        tokens: JwtService,
    }

    fn fast_passwords() -> PasswordService {
        PasswordService::with_params(1, 8, 1, std::time::Duration::from_secs(5)).unwrap()
    }

    fn harness() -> Harness {
        let clock: SharedClock = Arc::new(ManualClock::starting_now());
        let users = Arc::new(InMemoryUserDirectory::new(clock.clone()));
        let log = Arc::new(InMemoryAuthLogStore::new(clock.clone()));
        let passwords = fast_passwords();
        let tokens = JwtService::new(
            &SecretString::new("auth-service-test-secret".to_string()),
            "HS256",
            Duration::minutes(30),
            clock,
        )
        .unwrap();

        let service = AuthService::new(
            users.clone(),
            log.clone(),
            passwords.clone(),
            tokens.clone(),
            LockoutConfig::default(),
        )
        .unwrap();

        Harness {
            service,
            users,
            log,
            passwords,
            tokens,
        }
    }

    async fn seed_user(h: &Harness, username: &str, hashed_password: String) -> UserRecord {
        h.users
            .create(NewUser {
                username: username.to_string(),
                email: SafeEmail().fake(),
                hashed_password,
            })
            .await
            .unwrap()
    }

    struct FailingDirectory;

    #[async_trait]
    impl UserDirectory for FailingDirectory {
        async fn get_by_username(&self, _username: &str) -> anyhow::Result<Option<UserRecord>> {
            Err(anyhow!("connection refused"))
        }
        async fn get_by_id(&self, _id: Uuid) -> anyhow::Result<Option<UserRecord>> {
            Err(anyhow!("connection refused"))
        }
        async fn get_by_email(&self, _email: &str) -> anyhow::Result<Option<UserRecord>> {
            Err(anyhow!("connection refused"))
        }
        async fn create(&self, _new_user: NewUser) -> anyhow::Result<UserRecord> {
            Err(anyhow!("connection refused"))
        }
        async fn update(&self, _user: &UserRecord) -> anyhow::Result<Option<UserRecord>> {
            Err(anyhow!("connection refused"))
        }
        async fn update_password_hash(
            &self,
            _id: Uuid,
            _current_hash: &str,
            _new_hash: &str,
            _updated_at: chrono::DateTime<Utc>,
        ) -> anyhow::Result<bool> {
            Err(anyhow!("connection refused"))
        }
        async fn delete(&self, _id: Uuid) -> anyhow::Result<bool> {
            Err(anyhow!("connection refused"))
        }
        async fn list(&self, _skip: i64, _limit: i64) -> anyhow::Result<(Vec<UserRecord>, i64)> {
            Err(anyhow!("connection refused"))
        }
    }

    struct FailingAuthLog;

    #[async_trait]
    impl AuthLogStore for FailingAuthLog {
        async fn append(&self, _attempt: NewAuthAttempt) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }
        async fn count_recent_failures(
            &self,
            _user_id: Option<Uuid>,
            _ip_address: Option<&str>,
            _window_minutes: i64,
        ) -> anyhow::Result<i64> {
            Err(anyhow!("disk full"))
        }
    }

    #[tokio::test]
    async fn test_unknown_user_logs_one_anonymous_failure() {
        let h = harness();
        let username: String = Username().fake();

        let result = h
            .service
            .authenticate(&username, PASSWORD, Some("10.0.0.1"))
            .await
            .unwrap();
        assert!(result.is_none());

        let records = h.log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, None);
        assert!(!records[0].success);
        assert_eq!(records[0].ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(records[0].details.as_deref(), Some(DETAIL_USER_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_wrong_password_logs_failure_with_user() {
        let h = harness();
        let user = seed_user(&h, "alice", h.passwords.hash(PASSWORD).unwrap()).await;

        let result = h.service.authenticate("alice", "wrong password", None).await.unwrap();
        assert!(result.is_none());

        let records = h.log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, Some(user.id));
        assert!(!records[0].success);
        assert_eq!(records[0].details.as_deref(), Some(DETAIL_INVALID_PASSWORD));
    }

    #[tokio::test]
    async fn test_correct_password_issues_token_and_logs_success() {
        let h = harness();
        let user = seed_user(&h, "alice", h.passwords.hash(PASSWORD).unwrap()).await;

        let authenticated = h
            .service
            .authenticate("alice", PASSWORD, Some("10.0.0.2"))
            .await
            .unwrap()
            .expect("should authenticate");

        assert_eq!(authenticated.user_id, user.id);
        assert!(!authenticated.needs_rehash);
        assert_eq!(
            h.tokens.validate(&authenticated.token.token).unwrap(),
            user.id.to_string()
        );

        let records = h.log.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].user_id, Some(user.id));
    }

    #[tokio::test]
    async fn test_inactive_user_still_authenticates() {
        let h = harness();
        let mut user = seed_user(&h, "dormant", h.passwords.hash(PASSWORD).unwrap()).await;
        user.is_active = false;
        h.users.update(&user).await.unwrap();

        let result = h.service.authenticate("dormant", PASSWORD, None).await.unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_legacy_bcrypt_credential_flags_rehash() {
        let h = harness();
        let legacy = bcrypt::hash(PASSWORD, 4).unwrap();
        seed_user(&h, "veteran", legacy).await;

        let authenticated = h
            .service
            .authenticate("veteran", PASSWORD, None)
            .await
            .unwrap()
            .expect("legacy credential should verify");
        assert!(authenticated.needs_rehash);
    }

    #[tokio::test]
    async fn test_directory_fault_is_storage_unavailable() {
        let h = harness();
        let service = AuthService::new(
            Arc::new(FailingDirectory),
            h.log.clone(),
            h.passwords.clone(),
            h.tokens.clone(),
            LockoutConfig::default(),
        )
        .unwrap();

        let err = service.authenticate("alice", PASSWORD, None).await.unwrap_err();
        assert!(matches!(err, AuthError::StorageUnavailable(_)));
        assert_eq!(h.log.len(), 1);
        assert!(!h.log.records()[0].success);
    }

    #[tokio::test]
    async fn test_auth_log_fault_fails_closed() {
        let h = harness();
        seed_user(&h, "alice", h.passwords.hash(PASSWORD).unwrap()).await;
        let service = AuthService::new(
            h.users.clone(),
            Arc::new(FailingAuthLog),
            h.passwords.clone(),
            h.tokens.clone(),
            LockoutConfig::default(),
        )
        .unwrap();

        let err = service.authenticate("alice", PASSWORD, None).await.unwrap_err();
        assert!(matches!(err, AuthError::AuthLogUnavailable(_)));
    }

    #[tokio::test]
    async fn test_token_issue_failure_is_not_logged_as_success() {
        let h = harness();
        let user = seed_user(&h, "alice", h.passwords.hash(PASSWORD).unwrap()).await;
        let clock: SharedClock = Arc::new(ManualClock::starting_now());
        // Expiry lands past the last representable date
        let tokens = JwtService::new(
            &SecretString::new("auth-service-test-secret".to_string()),
            "HS256",
            Duration::days(365 * 300_000),
            clock,
        )
        .unwrap();
        let service = AuthService::new(
            h.users.clone(),
            h.log.clone(),
            h.passwords.clone(),
            tokens,
            LockoutConfig::default(),
        )
        .unwrap();

        let err = service.authenticate("alice", PASSWORD, None).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));

        let records = h.log.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].user_id, Some(user.id));
        assert_eq!(records[0].details.as_deref(), Some(DETAIL_TOKEN_ISSUE_FAILED));
    }

    /// Average wall time of `runs` calls for `username` with a wrong password
    async fn average_rejection_time(service: &AuthService, username: &str, runs: u32) -> std::time::Duration {
        let started = std::time::Instant::now();
        for _ in 0..runs {
            let result = service.authenticate(username, "not the password", None).await.unwrap();
            assert!(result.is_none());
        }
        started.elapsed() / runs
    }

    #[tokio::test]
    async fn test_unknown_user_costs_a_password_verification() {
        let h = harness();
        // Costly enough that one verification dwarfs the in-memory lookups
        let passwords =
            PasswordService::with_params(2, 4096, 1, std::time::Duration::from_secs(30)).unwrap();
        let service = AuthService::new(
            h.users.clone(),
            h.log.clone(),
            passwords.clone(),
            h.tokens.clone(),
            LockoutConfig::default(),
        )
        .unwrap();
        seed_user(&h, "alice", passwords.hash(PASSWORD).unwrap()).await;

        let known = average_rejection_time(&service, "alice", 3).await;
        let unknown = average_rejection_time(&service, "nobody", 3).await;

        assert!(
            unknown * 4 >= known,
            "unknown user took {unknown:?}, known user with wrong password took {known:?}"
        );
        assert_eq!(h.log.len(), 6);
    }

    #[tokio::test]
    async fn test_recent_failed_attempts_counts_by_user_then_ip() {
        let h = harness();
        let user = seed_user(&h, "alice", h.passwords.hash(PASSWORD).unwrap()).await;

        for _ in 0..3 {
            h.service.authenticate("alice", "nope", Some("10.0.0.9")).await.unwrap();
        }
        h.service.authenticate("ghost", "nope", Some("10.0.0.9")).await.unwrap();

        let by_user = h
            .service
            .recent_failed_attempts(Some(user.id), Some("10.0.0.9"), 15)
            .await
            .unwrap();
        let by_ip = h
            .service
            .recent_failed_attempts(None, Some("10.0.0.9"), 15)
            .await
            .unwrap();
        let neither = h.service.recent_failed_attempts(None, None, 15).await.unwrap();

        assert_eq!(by_user, 3);
        assert_eq!(by_ip, 4);
        assert_eq!(neither, 0);
    }

    #[tokio::test]
    async fn test_account_status_crosses_threshold() {
        let h = harness();
        seed_user(&h, "alice", h.passwords.hash(PASSWORD).unwrap()).await;

        for _ in 0..4 {
            h.service.authenticate("alice", "nope", None).await.unwrap();
        }
        assert_eq!(
            h.service.check_account_status("alice").await.unwrap(),
            AccountStatus::Active
        );

        h.service.authenticate("alice", "nope", None).await.unwrap();
        let status = h.service.check_account_status("alice").await.unwrap();
        assert!(status.is_locked());
        assert_eq!(status, AccountStatus::Locked { failed_attempts: 5 });

        // Reported only: the right password still works
        assert!(h.service.authenticate("alice", PASSWORD, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_user_status_is_active() {
        let h = harness();
        let status = h.service.check_account_status("nobody").await.unwrap();
        assert_eq!(status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn test_exactly_one_record_per_call() {
        let h = harness();
        seed_user(&h, "alice", h.passwords.hash(PASSWORD).unwrap()).await;

        h.service.authenticate("alice", PASSWORD, None).await.unwrap();
        h.service.authenticate("alice", "nope", None).await.unwrap();
        h.service.authenticate("bob", PASSWORD, None).await.unwrap();

        assert_eq!(h.log.len(), 3);
        assert!(h.log.records().iter().all(|r| r.timestamp <= Utc::now()));
    }
}

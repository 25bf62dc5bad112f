//! Password hashing using argon2, with bcrypt accepted for verification
//!
//! New credentials are always Argon2id PHC strings carrying their own
//! algorithm tag, cost parameters and salt. Older bcrypt credentials still
//! verify so a live user table can migrate without forcing resets; see
//! [`PasswordService::needs_rehash`].
//!
//! # Performance Considerations
//!
//! Argon2 is intentionally CPU- and memory-intensive. In async contexts use
//! `hash_async`/`verify_async`, which run on the blocking pool under a
//! bounded timeout.

use crate::config::PasswordConfig;
use anyhow::Result;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::time::Duration;
use tracing::warn;
use user_management_shared::AuthError;

/// Modular-crypt prefixes produced by bcrypt implementations
const LEGACY_BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

/// Password hashing service
///
/// Uses Argon2id with configurable cost. Cloning is cheap.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    timeout: Duration,
}

impl PasswordService {
    /// Build from configuration
    pub fn new(config: &PasswordConfig) -> Result<Self> {
        Self::with_params(
            config.time_cost,
            config.memory_cost_kib,
            config.parallelism,
            Duration::from_millis(config.hash_timeout_ms),
        )
    }

    /// Build with explicit argon2 cost parameters
    pub fn with_params(
        time_cost: u32,
        memory_cost_kib: u32,
        parallelism: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let params = Params::new(memory_cost_kib, time_cost, parallelism, None)
            .map_err(|e| anyhow::anyhow!("Failed to build Argon2 params: {}", e))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            timeout,
        })
    }

    /// Hash a password (blocking operation)
    ///
    /// A fresh salt is drawn on every call, so the same input never encodes
    /// the same way twice.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
        Ok(hash.to_string())
    }

    /// Verify a password against an encoded credential (blocking operation)
    ///
    /// Parameters come from the encoding, not from this service, so hashes
    /// made under older cost settings still verify. Malformed input is
    /// simply a non-match.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        if is_legacy_hash(encoded) {
            return bcrypt::verify(password, encoded).unwrap_or(false);
        }

        match PasswordHash::new(encoded) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Whether a stored credential should be re-hashed with current settings
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        if is_legacy_hash(encoded) {
            return true;
        }

        let Ok(parsed) = PasswordHash::new(encoded) else {
            return true;
        };
        if parsed.algorithm != argon2::ARGON2ID_IDENT {
            return true;
        }

        let current = self.argon2.params();
        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() != current.m_cost()
                    || stored.t_cost() != current.t_cost()
                    || stored.p_cost() != current.p_cost()
            }
            Err(_) => true,
        }
    }

    /// Hash a password on the blocking thread pool
    pub async fn hash_async(&self, password: String) -> Result<String, AuthError> {
        let service = self.clone();
        self.run_blocking(move || service.hash(&password))
            .await?
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Verify a password on the blocking thread pool
    pub async fn verify_async(&self, password: String, encoded: String) -> Result<bool, AuthError> {
        let service = self.clone();
        self.run_blocking(move || service.verify(&password, &encoded))
            .await
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, AuthError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AuthError::Internal(format!("Task join error: {}", e))),
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Password hashing timed out");
                Err(AuthError::HashingTimeout)
            }
        }
    }
}

fn is_legacy_hash(encoded: &str) -> bool {
    LEGACY_BCRYPT_PREFIXES
        .iter()
        .any(|prefix| encoded.starts_with(prefix))
}

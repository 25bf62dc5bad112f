//! Data access layer
//!
//! Storage sits behind the [`UserDirectory`] and [`AuthLogStore`] traits so
//! services never see whether PostgreSQL or memory is underneath.

pub mod auth_log;
pub mod memory;
pub mod user;

pub use auth_log::{
    AuthAttemptRecord, AuthLogStore, NewAuthAttempt, NoopAuthLogStore, PgAuthLogRepository,
};
pub use memory::{InMemoryAuthLogStore, InMemoryUserDirectory};
pub use user::{NewUser, PgUserRepository, UniqueViolation, UserDirectory, UserRecord};

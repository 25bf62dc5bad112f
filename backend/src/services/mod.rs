//! Business logic services
//!
//! Services encapsulate business logic and coordinate between
//! repositories and external systems.

pub mod auth;
pub mod user;

pub use auth::{AccountStatus, AuthService, Authenticated};
pub use user::UserService;

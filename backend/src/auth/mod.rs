//! Authentication module
//!
//! Provides JWT-based authentication with argon2 password hashing
//! (bcrypt accepted for legacy credentials).

mod jwt;
mod middleware;
mod password;

pub use jwt::{parse_algorithm, AccessToken, Claims, JwtKeys, JwtService};
pub use middleware::AuthUser;
pub use password::PasswordService;

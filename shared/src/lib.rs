//! User Management Shared Library
//!
//! This crate contains request/response types, validation rules and the
//! authentication error taxonomy shared by the backend and its clients.

pub mod errors;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use errors::*;
pub use types::*;
pub use validation::ValidationError;

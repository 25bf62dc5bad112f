//! Input validation functions
//!
//! Pure checks run before any entity is constructed. Each returns a
//! [`ValidationError`] naming the offending field.

use crate::types::{Pagination, UserCreate, UserUpdate};
use thiserror::Error;
use validator::ValidateEmail;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const PAGE_SIZE_MAX: i64 = 100;

/// Validation error with field context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{display_label}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub display_label: String,
}

impl ValidationError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
            display_label: get_field_display_label(field).to_string(),
        }
    }

    /// Format as user-friendly error message
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

/// Map technical field names to user-friendly display labels
pub fn get_field_display_label(field_name: &str) -> &str {
    match field_name {
        "username" => "Username",
        "email" => "Email",
        "password" => "Password",
        "page" => "Page",
        "size" => "Page Size",
        _ => field_name,
    }
}

/// Validate username length
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if username.trim().is_empty() {
        return Err(ValidationError::new("username", "cannot be empty"));
    }
    if len < USERNAME_MIN_LEN {
        return Err(ValidationError::new(
            "username",
            &format!("must be at least {} characters", USERNAME_MIN_LEN),
        ));
    }
    if len > USERNAME_MAX_LEN {
        return Err(ValidationError::new(
            "username",
            &format!("must be at most {} characters", USERNAME_MAX_LEN),
        ));
    }
    Ok(())
}

/// Validate email format
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::new("email", "cannot be empty"));
    }
    if email.len() > 255 {
        return Err(ValidationError::new("email", "too long"));
    }
    if !email.validate_email() {
        return Err(ValidationError::new("email", "invalid format"));
    }
    Ok(())
}

/// Validate password length
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < PASSWORD_MIN_LEN {
        return Err(ValidationError::new(
            "password",
            &format!("must be at least {} characters", PASSWORD_MIN_LEN),
        ));
    }
    if password.len() > PASSWORD_MAX_LEN {
        return Err(ValidationError::new("password", "too long"));
    }
    Ok(())
}

/// Validate a registration request
pub fn validate_user_create(req: &UserCreate) -> Result<(), ValidationError> {
    validate_username(&req.username)?;
    validate_email(&req.email)?;
    validate_password(&req.password)
}

/// Validate only the fields present in a partial update
pub fn validate_user_update(req: &UserUpdate) -> Result<(), ValidationError> {
    if let Some(username) = &req.username {
        validate_username(username)?;
    }
    if let Some(email) = &req.email {
        validate_email(email)?;
    }
    if let Some(password) = &req.password {
        validate_password(password)?;
    }
    Ok(())
}

/// Validate pagination parameters
pub fn validate_pagination(pagination: &Pagination) -> Result<(), ValidationError> {
    if pagination.page < 1 {
        return Err(ValidationError::new("page", "must be >= 1"));
    }
    if pagination.size < 1 {
        return Err(ValidationError::new("size", "must be >= 1"));
    }
    if pagination.size > PAGE_SIZE_MAX {
        return Err(ValidationError::new("size", "must be <= 100"));
    }
    if pagination.offset().is_none() {
        return Err(ValidationError::new("page", "out of range"));
    }
    Ok(())
}

//! User management service
//!
//! Registration, lookup, paging, partial update and deletion. Passwords
//! are hashed here on the blocking pool; plaintext never reaches storage.

use crate::auth::PasswordService;
use crate::clock::SharedClock;
use crate::error::{ApiError, ApiResult};
use crate::repositories::{NewUser, UniqueViolation, UserDirectory, UserRecord};
use std::sync::Arc;
use tracing::{debug, error, info};
use user_management_shared::validation::{
    validate_pagination, validate_user_create, validate_user_update,
};
use user_management_shared::{
    Pagination, UserCreate, UserResponse, UserUpdate, UsersPage, ValidationError,
};
use uuid::Uuid;

/// User service
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserDirectory>,
    passwords: PasswordService,
    clock: SharedClock,
}

fn storage_fault(err: anyhow::Error) -> ApiError {
    // A concurrent writer won the unique index after our pre-check
    if let Some(violation) = err.downcast_ref::<UniqueViolation>() {
        return match violation.column {
            "email" => ApiError::Conflict("Email already registered".to_string()),
            _ => ApiError::Conflict("Username already registered".to_string()),
        };
    }
    error!(error = %err, "User directory operation failed");
    ApiError::ServiceUnavailable(err.to_string())
}

impl UserService {
    pub fn new(users: Arc<dyn UserDirectory>, passwords: PasswordService, clock: SharedClock) -> Self {
        Self {
            users,
            passwords,
            clock,
        }
    }

    /// Register a new user
    pub async fn create(&self, req: UserCreate) -> ApiResult<UserRecord> {
        validate_user_create(&req)?;

        let username = req.username.trim().to_string();
        let email = req.email.trim().to_string();

        if self.users.get_by_email(&email).await.map_err(storage_fault)?.is_some() {
            return Err(ApiError::Conflict("Email already registered".to_string()));
        }
        if self
            .users
            .get_by_username(&username)
            .await
            .map_err(storage_fault)?
            .is_some()
        {
            return Err(ApiError::Conflict("Username already registered".to_string()));
        }

        let hashed_password = self.passwords.hash_async(req.password).await?;

        let user = self
            .users
            .create(NewUser {
                username,
                email,
                hashed_password,
            })
            .await
            .map_err(storage_fault)?;

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Fetch a user or 404
    pub async fn get(&self, id: Uuid) -> ApiResult<UserRecord> {
        self.users
            .get_by_id(id)
            .await
            .map_err(storage_fault)?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// One page of users
    pub async fn list(&self, pagination: &Pagination) -> ApiResult<UsersPage> {
        validate_pagination(pagination)?;
        let offset = pagination
            .offset()
            .ok_or_else(|| ValidationError::new("page", "out of range"))?;

        let (users, total) = self
            .users
            .list(offset, pagination.size)
            .await
            .map_err(storage_fault)?;

        Ok(UsersPage {
            items: users.into_iter().map(UserResponse::from).collect(),
            total,
            page: pagination.page,
            size: pagination.size,
            pages: pagination.total_pages(total),
        })
    }

    /// Apply the fields present in `req`
    pub async fn update(&self, id: Uuid, req: UserUpdate) -> ApiResult<UserRecord> {
        validate_user_update(&req)?;

        let mut user = self.get(id).await?;

        if let Some(email) = req.email.as_deref().map(str::trim) {
            if email != user.email {
                let taken = self.users.get_by_email(email).await.map_err(storage_fault)?;
                if taken.is_some_and(|other| other.id != id) {
                    return Err(ApiError::Conflict("Email already registered".to_string()));
                }
                user.email = email.to_string();
            }
        }

        if let Some(username) = req.username.as_deref().map(str::trim) {
            if username != user.username {
                let taken = self
                    .users
                    .get_by_username(username)
                    .await
                    .map_err(storage_fault)?;
                if taken.is_some_and(|other| other.id != id) {
                    return Err(ApiError::Conflict("Username already registered".to_string()));
                }
                user.username = username.to_string();
            }
        }

        if let Some(password) = req.password {
            user.hashed_password = self.passwords.hash_async(password).await?;
        }

        if let Some(is_active) = req.is_active {
            user.is_active = is_active;
        }

        user.updated_at = self.clock.now();

        self.users
            .update(&user)
            .await
            .map_err(storage_fault)?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// Delete a user or 404
    pub async fn delete(&self, id: Uuid) -> ApiResult<()> {
        if !self.users.delete(id).await.map_err(storage_fault)? {
            return Err(ApiError::NotFound("User not found".to_string()));
        }
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Re-hash a verified plaintext with the current algorithm and cost
    ///
    /// Only the credential is written, and only if it is unchanged since it
    /// was read; a password change that lands meanwhile wins.
    pub async fn upgrade_password_hash(&self, id: Uuid, password: String) -> ApiResult<()> {
        let user = self.get(id).await?;
        if !self.passwords.needs_rehash(&user.hashed_password) {
            return Ok(());
        }

        let new_hash = self.passwords.hash_async(password).await?;
        let swapped = self
            .users
            .update_password_hash(id, &user.hashed_password, &new_hash, self.clock.now())
            .await
            .map_err(storage_fault)?;

        if swapped {
            info!(user_id = %id, "Password hash upgraded");
        } else {
            debug!(user_id = %id, "Credential changed during upgrade; left as is");
        }
        Ok(())
    }
}

//! Authentication extractor
//!
//! Validates `Authorization: Bearer <token>` with the pre-computed JWT
//! service from AppState. Every rejection is a 401 carrying
//! `WWW-Authenticate: Bearer` and the same generic message.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::FromRef,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;
use uuid::Uuid;

const CREDENTIALS_REJECTED: &str = "Could not validate credentials";

/// Authenticated user extracted from JWT
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::Unauthorized(CREDENTIALS_REJECTED.to_string()))?;

        let subject = app_state.jwt().validate(token).map_err(|e| {
            debug!(error = %e, "Bearer token rejected");
            ApiError::Unauthorized(CREDENTIALS_REJECTED.to_string())
        })?;

        let user_id = Uuid::parse_str(&subject)
            .map_err(|_| ApiError::Unauthorized(CREDENTIALS_REJECTED.to_string()))?;

        Ok(AuthUser { user_id })
    }
}

/// Extract the token from a `Bearer` authorization value
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

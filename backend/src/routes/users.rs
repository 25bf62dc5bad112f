//! User management routes
//!
//! Registration is public; everything else requires a bearer token.

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use user_management_shared::{Pagination, UserCreate, UserResponse, UserUpdate, UsersPage};
use uuid::Uuid;

/// Create user routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(get_me))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

/// Register a new user
///
/// POST /users
async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<UserCreate>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let user = state.users.create(req).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /users?page=&size=
async fn list_users(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<UsersPage>> {
    let page = state.users.list(&pagination).await?;
    Ok(Json(page))
}

/// The caller's own record
///
/// GET /users/me
async fn get_me(State(state): State<AppState>, auth_user: AuthUser) -> ApiResult<Json<UserResponse>> {
    let user = state.users.get(auth_user.user_id).await?;
    Ok(Json(user.into()))
}

async fn get_user(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.users.get(id).await?;
    Ok(Json(user.into()))
}

async fn update_user(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UserUpdate>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.users.update(id, req).await?;
    Ok(Json(user.into()))
}

async fn delete_user(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

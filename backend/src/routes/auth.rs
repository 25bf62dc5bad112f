//! Authentication routes
//!
//! Provides the password login endpoints, as an HTML-style form post and as
//! JSON. Both answer with the same bearer token shape and the same 401 for
//! any credential failure.
//!
//! # Performance Optimizations
//!
//! - Uses pre-computed JWT keys from AppState (no per-request allocation)
//! - Password verification runs on blocking thread pool (doesn't block async runtime)

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, State},
    routing::post,
    Form, Json, Router,
};
use std::net::SocketAddr;
use tracing::{error, warn};
use user_management_shared::{AuthError, Token, UserLogin};

/// Create auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login_form))
        .route("/login/json", post(login_json))
}

/// Login with form-encoded username and password
///
/// POST /auth/login
async fn login_form(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Form(credentials): Form<UserLogin>,
) -> ApiResult<Json<Token>> {
    login(&state, client_ip(connect_info), credentials).await.map(Json)
}

/// Login with a JSON body
///
/// POST /auth/login/json
async fn login_json(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(credentials): Json<UserLogin>,
) -> ApiResult<Json<Token>> {
    login(&state, client_ip(connect_info), credentials).await.map(Json)
}

fn client_ip(connect_info: Option<ConnectInfo<SocketAddr>>) -> Option<String> {
    connect_info.map(|ConnectInfo(addr)| addr.ip().to_string())
}

async fn login(state: &AppState, client_ip: Option<String>, credentials: UserLogin) -> ApiResult<Token> {
    report_lockout(state, &credentials.username).await;

    let authenticated = match state
        .auth
        .authenticate(&credentials.username, &credentials.password, client_ip.as_deref())
        .await
    {
        Ok(Some(authenticated)) => authenticated,
        Ok(None) => return Err(ApiError::InvalidCredentials),
        Err(AuthError::AuthLogUnavailable(msg)) => {
            // Without an audit record the login does not count
            error!(error = %msg, "Auth log unavailable; rejecting login");
            return Err(ApiError::InvalidCredentials);
        }
        Err(e) => return Err(e.into()),
    };

    if authenticated.needs_rehash {
        let users = state.users.clone();
        let user_id = authenticated.user_id;
        let password = credentials.password;
        tokio::spawn(async move {
            if let Err(e) = users.upgrade_password_hash(user_id, password).await {
                warn!(user_id = %user_id, error = %e, "Credential upgrade failed");
            }
        });
    }

    Ok(Token::bearer(authenticated.token.token))
}

/// Log when an account has crossed the failure threshold. Never blocks.
async fn report_lockout(state: &AppState, username: &str) {
    match state.auth.check_account_status(username).await {
        Ok(status) if status.is_locked() => {
            warn!(username = %username, status = ?status, "Login attempt on account over failure threshold");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not compute account status"),
    }
}

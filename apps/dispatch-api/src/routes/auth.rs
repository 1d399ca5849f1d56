//! Auth routes: password login and token refresh.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::tokens;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::user::{User, UserSummary};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/login
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    pub user: UserSummary,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ApiErrorBody),
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .users
        .find_by_username(body.username.trim())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    verify_password(&body.password, &user.password_hash)?;

    tracing::info!(user_id = %user.id, "user logged in");

    token_pair(&state, user).map(Json)
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/refresh
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = LoginResponse),
        (status = 401, description = "Invalid refresh token", body = ApiErrorBody),
    ),
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let claims = tokens::verify_refresh(&body.refresh_token, &state.config.jwt_secret)?;

    // Re-resolve the subject so a deleted account cannot keep refreshing.
    let user = state
        .users
        .get(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unknown subject"))?;

    token_pair(&state, user).map(Json)
}

/// Issue a fresh access/refresh pair for a user.
fn token_pair(state: &AppState, user: User) -> Result<LoginResponse, ApiError> {
    let access_token = tokens::mint(
        &user,
        tokens::TOKEN_USE_ACCESS,
        state.config.access_token_ttl_secs,
        &state.config.jwt_secret,
    )?;
    let refresh_token = tokens::mint(
        &user,
        tokens::TOKEN_USE_REFRESH,
        state.config.refresh_token_ttl_secs,
        &state.config.jwt_secret,
    )?;

    Ok(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.access_token_ttl_secs as u64,
        refresh_token,
        user: user.summary(),
    })
}

/// Check a password against its Argon2id hash.
fn verify_password(password: &str, hash: &str) -> Result<(), ApiError> {
    use argon2::Argon2;
    use password_hash::{PasswordHash, PasswordVerifier};

    let parsed = PasswordHash::new(hash).map_err(|_| ApiError::internal("invalid hash format"))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::unauthorized("Invalid credentials"))
}

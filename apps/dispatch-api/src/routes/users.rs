//! User registration.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::user::{Role, User, UserSummary};
use crate::AppState;
use ridewire_common::id::PrefixedId;

pub fn router() -> Router<AppState> {
    Router::new().route("/users", post(create_user))
}

// ---------------------------------------------------------------------------
// POST /api/v1/users
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    /// Either `rider` or `driver`.
    pub role: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User registered", body = UserSummary),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 409, description = "Username already taken", body = ApiErrorBody),
    ),
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserSummary>), ApiError> {
    // --- Validation ---
    let mut errors: Vec<FieldError> = Vec::new();

    // Username: 2-32 chars, alphanumeric + _ . -
    let username = body.username.trim().to_string();
    if username.len() < 2 || username.len() > 32 {
        errors.push(FieldError {
            field: "username".into(),
            message: "Username must be 2-32 characters".into(),
        });
    } else if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        errors.push(FieldError {
            field: "username".into(),
            message: "Username may only contain letters, digits, underscores, dots, and hyphens"
                .into(),
        });
    }

    // Names: 1-64 chars
    let first_name = body.first_name.trim().to_string();
    if first_name.is_empty() || first_name.len() > 64 {
        errors.push(FieldError {
            field: "first_name".into(),
            message: "First name must be 1-64 characters".into(),
        });
    }
    let last_name = body.last_name.trim().to_string();
    if last_name.is_empty() || last_name.len() > 64 {
        errors.push(FieldError {
            field: "last_name".into(),
            message: "Last name must be 1-64 characters".into(),
        });
    }

    // Password: min 10 chars
    if body.password.len() < 10 {
        errors.push(FieldError {
            field: "password".into(),
            message: "Password must be at least 10 characters".into(),
        });
    }

    // Role is validated last so its failure report includes every earlier
    // field error too.
    let role = match Role::parse(body.role.trim()) {
        Some(role) => role,
        None => {
            errors.push(FieldError {
                field: "role".into(),
                message: "Role must be either rider or driver".into(),
            });
            return Err(ApiError::validation(errors));
        }
    };

    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    // --- Hash password with Argon2id ---
    let password_hash = hash_password(&body.password)?;

    let user = state
        .users
        .create(User {
            id: User::generate(),
            username,
            first_name,
            last_name,
            role,
            password_hash,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(
        user_id = %user.id,
        username = %user.username,
        role = user.role.as_str(),
        "user registered"
    );

    Ok((StatusCode::CREATED, Json(user.summary())))
}

/// Hash a password using Argon2id with a random salt.
fn hash_password(password: &str) -> Result<String, ApiError> {
    use argon2::Argon2;
    use password_hash::rand_core::OsRng;
    use password_hash::{PasswordHasher, SaltString};

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            tracing::error!(?e, "password hashing failed");
            ApiError::internal("Failed to hash password")
        })
}

//! Access and refresh token management.
//!
//! Both token kinds are HS256 JWTs signed with the shared `JWT_SECRET`. They
//! differ only in TTL and the `token_use` claim, which keeps a refresh token
//! from ever being accepted where an access token is required.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::user::{Role, User};

pub const TOKEN_USE_ACCESS: &str = "access";
pub const TOKEN_USE_REFRESH: &str = "refresh";

/// Claims embedded in every token. Identity fields ride along so the
/// gateway can authenticate a session without a second lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the user's prefixed ULID.
    pub sub: String,
    /// Expiration (unix timestamp).
    pub exp: i64,
    /// Issued-at (unix timestamp).
    pub iat: i64,
    /// Either `access` or `refresh`.
    pub token_use: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Mint a signed token for a user.
pub fn mint(
    user: &User,
    token_use: &str,
    ttl_secs: i64,
    secret: &str,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        iat: now.timestamp(),
        token_use: token_use.to_string(),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        role: user.role,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(?e, "failed to sign token");
        ApiError::internal("Token signing failed")
    })
}

/// Verify a token's signature, expiry, and `token_use` claim.
pub fn verify(token: &str, expected_use: &str, secret: &str) -> Result<Claims, ApiError> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        tracing::debug!(?e, "token rejected");
        ApiError::unauthorized("Invalid or expired token")
    })?;

    if data.claims.token_use != expected_use {
        return Err(ApiError::unauthorized("Invalid or expired token"));
    }
    Ok(data.claims)
}

pub fn verify_access(token: &str, secret: &str) -> Result<Claims, ApiError> {
    verify(token, TOKEN_USE_ACCESS, secret)
}

pub fn verify_refresh(token: &str, secret: &str) -> Result<Claims, ApiError> {
    verify(token, TOKEN_USE_REFRESH, secret)
}

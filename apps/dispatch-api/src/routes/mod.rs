pub mod auth;
pub mod health;
pub mod trips;
pub mod users;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api/v1",
            users::router().merge(auth::router()).merge(trips::router()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Users
        users::create_user,
        // Auth
        auth::login,
        auth::refresh,
        // Trips
        trips::list_trips,
        trips::get_trip,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::user::Role,
            crate::models::user::UserSummary,
            crate::models::trip::TripStatus,
            crate::models::trip::TripView,
            // Route request/response types
            health::HealthResponse,
            users::CreateUserRequest,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::RefreshRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Users", description = "Account registration"),
        (name = "Auth", description = "Authentication"),
        (name = "Trips", description = "Trip records"),
    )
)]
pub struct ApiDoc;

//! Trip listing and retrieval.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::trip::TripView;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips))
        .route("/trips/{trip_id}", get(get_trip))
}

// ---------------------------------------------------------------------------
// GET /api/v1/trips
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/trips",
    tag = "Trips",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Trips where the caller is rider or driver", body = [TripView]),
        (status = 401, description = "Missing or invalid token", body = ApiErrorBody),
    ),
)]
pub async fn list_trips(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<TripView>>, ApiError> {
    let trips = state.trips.list_for_user(&user_id).await?;
    let mut views = Vec::with_capacity(trips.len());
    for trip in &trips {
        views.push(state.dispatcher.view(trip).await?);
    }
    Ok(Json(views))
}

// ---------------------------------------------------------------------------
// GET /api/v1/trips/{trip_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/trips/{trip_id}",
    tag = "Trips",
    security(("bearer" = [])),
    params(
        ("trip_id" = String, Path, description = "Prefixed trip ULID"),
    ),
    responses(
        (status = 200, description = "Trip detail", body = TripView),
        (status = 401, description = "Missing or invalid token", body = ApiErrorBody),
        (status = 404, description = "Unknown trip id", body = ApiErrorBody),
    ),
)]
pub async fn get_trip(
    AuthUser { user_id: _ }: AuthUser,
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripView>, ApiError> {
    let trip = state
        .trips
        .get(&trip_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Trip not found"))?;

    Ok(Json(state.dispatcher.view(&trip).await?))
}

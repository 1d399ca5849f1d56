use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::ApiError;
use crate::models::trip::{Trip, TripStatus};

/// Field changes applied by [`TripRepository::update`]. `None` leaves the
/// field untouched; the driver can be assigned but never cleared.
#[derive(Debug, Default)]
pub struct TripChanges {
    pub pick_up_address: Option<String>,
    pub drop_off_address: Option<String>,
    pub status: Option<TripStatus>,
    pub driver_id: Option<String>,
}

/// Abstraction over trip storage, shared by the dispatch logic and the HTTP
/// surface.
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn create(&self, trip: Trip) -> Result<Trip, ApiError>;
    async fn get(&self, id: &str) -> Result<Option<Trip>, ApiError>;
    /// Apply `changes` and return the post-mutation record, or `None` for an
    /// unknown id. The forward-only status rule is enforced here, atomically
    /// with the write, so racing updates cannot persist a backward
    /// transition.
    async fn update(&self, id: &str, changes: TripChanges) -> Result<Option<Trip>, ApiError>;
    /// Trips where the user is the rider or the assigned driver, oldest
    /// first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Trip>, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

pub struct MemoryTrips {
    trips: DashMap<String, Trip>,
}

impl MemoryTrips {
    pub fn new() -> Self {
        Self {
            trips: DashMap::new(),
        }
    }
}

#[async_trait]
impl TripRepository for MemoryTrips {
    async fn create(&self, trip: Trip) -> Result<Trip, ApiError> {
        self.trips.insert(trip.id.clone(), trip.clone());
        Ok(trip)
    }

    async fn get(&self, id: &str) -> Result<Option<Trip>, ApiError> {
        Ok(self.trips.get(id).map(|t| t.clone()))
    }

    async fn update(&self, id: &str, changes: TripChanges) -> Result<Option<Trip>, ApiError> {
        // The entry lock makes the read-modify-write atomic per trip, so the
        // transition check and the write see the same snapshot.
        match self.trips.get_mut(id) {
            Some(mut trip) => {
                if let Some(status) = changes.status {
                    if !trip.status.can_transition_to(status) {
                        return Err(ApiError::bad_request(format!(
                            "Cannot move a {} trip back to {}",
                            trip.status.as_str(),
                            status.as_str()
                        )));
                    }
                }
                if let Some(pick_up) = changes.pick_up_address {
                    trip.pick_up_address = pick_up;
                }
                if let Some(drop_off) = changes.drop_off_address {
                    trip.drop_off_address = drop_off;
                }
                if let Some(status) = changes.status {
                    trip.status = status;
                }
                if let Some(driver_id) = changes.driver_id {
                    trip.driver_id = Some(driver_id);
                }
                trip.updated_at = Utc::now();
                Ok(Some(trip.clone()))
            }
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Trip>, ApiError> {
        let mut trips: Vec<Trip> = self
            .trips
            .iter()
            .filter(|t| t.rider_id == user_id || t.driver_id.as_deref() == Some(user_id))
            .map(|t| t.clone())
            .collect();
        trips.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(trips)
    }
}

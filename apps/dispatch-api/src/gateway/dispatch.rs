//! Trip dispatch logic.
//!
//! Interprets create/update trip messages from gateway sessions, mutates the
//! trip repository, and decides which groups hear about the result. The
//! dispatcher holds no state of its own; everything it knows it reads
//! through the repositories, so the persisted change and the broadcast are
//! computed from the same snapshot.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::bus::GroupBus;
use crate::db::trips::{TripChanges, TripRepository};
use crate::db::users::UserRepository;
use crate::error::{ApiError, FieldError};
use crate::gateway::envelope::{Envelope, TYPE_TRIP_CREATED, TYPE_TRIP_UPDATED};
use crate::models::trip::{Trip, TripStatus, TripView};
use crate::models::user::{Role, UserSummary};
use ridewire_common::id::PrefixedId;

/// Well-known group every driver session joins at connect time. Trip groups
/// are named by the trip id itself.
pub const DRIVER_POOL: &str = "drivers";

#[derive(Clone)]
pub struct TripDispatcher {
    users: Arc<dyn UserRepository>,
    trips: Arc<dyn TripRepository>,
    bus: Arc<dyn GroupBus>,
}

#[derive(Debug, Deserialize)]
struct CreateTripPayload {
    #[serde(default)]
    pick_up_address: Option<String>,
    #[serde(default)]
    drop_off_address: Option<String>,
    /// Optional; when present it must name the requesting user.
    #[serde(default)]
    rider: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateTripPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    pick_up_address: Option<String>,
    #[serde(default)]
    drop_off_address: Option<String>,
    #[serde(default)]
    status: Option<TripStatus>,
    #[serde(default)]
    driver: Option<String>,
}

impl TripDispatcher {
    pub fn new(
        users: Arc<dyn UserRepository>,
        trips: Arc<dyn TripRepository>,
        bus: Arc<dyn GroupBus>,
    ) -> Self {
        Self { users, trips, bus }
    }

    /// Create a trip for the requesting user.
    ///
    /// Persists the trip with status `REQUESTED` and no driver, alerts the
    /// driver pool, and returns the confirmation envelope for the requesting
    /// session alone. The requester is not subscribed to the trip's group
    /// here; sessions join it explicitly once they hold the trip id.
    pub async fn create_trip(
        &self,
        identity: &UserSummary,
        data: Value,
    ) -> Result<Envelope, ApiError> {
        let payload: CreateTripPayload = serde_json::from_value(data)
            .map_err(|_| ApiError::bad_request("Malformed create.trip payload"))?;

        let mut errors = Vec::new();
        let pick_up = payload
            .pick_up_address
            .as_deref()
            .map(str::trim)
            .unwrap_or("");
        if pick_up.is_empty() {
            errors.push(FieldError {
                field: "pick_up_address".to_string(),
                message: "Pick-up address is required".to_string(),
            });
        }
        let drop_off = payload
            .drop_off_address
            .as_deref()
            .map(str::trim)
            .unwrap_or("");
        if drop_off.is_empty() {
            errors.push(FieldError {
                field: "drop_off_address".to_string(),
                message: "Drop-off address is required".to_string(),
            });
        }
        if let Some(rider) = &payload.rider {
            if rider != &identity.id {
                errors.push(FieldError {
                    field: "rider".to_string(),
                    message: "Trips can only be requested for yourself".to_string(),
                });
            }
        }
        if !errors.is_empty() {
            return Err(ApiError::validation(errors));
        }

        let now = Utc::now();
        let trip = self
            .trips
            .create(Trip {
                id: Trip::generate(),
                pick_up_address: pick_up.to_string(),
                drop_off_address: drop_off.to_string(),
                status: TripStatus::Requested,
                rider_id: identity.id.clone(),
                driver_id: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(trip_id = %trip.id, rider_id = %identity.id, "trip requested");

        // The requester is the rider, so no lookup is needed for the view.
        let view = TripView::new(&trip, Some(identity.clone()), None);
        let data = serde_json::to_value(&view).map_err(|_| ApiError::internal("serialization"))?;

        self.bus
            .publish(DRIVER_POOL, Envelope::new(TYPE_TRIP_CREATED, data.clone()))
            .await;
        Ok(Envelope::new(TYPE_TRIP_CREATED, data))
    }

    /// Update an existing trip's status, addresses, or driver assignment.
    ///
    /// The post-mutation trip is broadcast to the trip's own group; the
    /// sender gets no separate confirmation and hears the result only if it
    /// is subscribed like everyone else.
    pub async fn update_trip(&self, identity: &UserSummary, data: Value) -> Result<(), ApiError> {
        let payload: UpdateTripPayload = serde_json::from_value(data)
            .map_err(|_| ApiError::bad_request("Malformed update.trip payload"))?;

        let trip_id = match payload.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(ApiError::validation(vec![FieldError {
                    field: "id".to_string(),
                    message: "Trip id is required".to_string(),
                }]))
            }
        };
        let status = match payload.status {
            Some(status) => status,
            None => {
                return Err(ApiError::validation(vec![FieldError {
                    field: "status".to_string(),
                    message: "Status is required".to_string(),
                }]))
            }
        };

        // Existence first, so an unknown id reads as NOT_FOUND rather than a
        // driver validation failure. The transition rule itself is enforced
        // by the repository, atomically with the write.
        self.trips
            .get(&trip_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Trip not found"))?;

        let driver = match payload.driver.as_deref().map(str::trim) {
            Some(driver_id) if !driver_id.is_empty() => {
                let driver = self.users.get(driver_id).await?.ok_or_else(|| {
                    ApiError::validation(vec![FieldError {
                        field: "driver".to_string(),
                        message: "Driver not found".to_string(),
                    }])
                })?;
                if driver.role != Role::Driver {
                    return Err(ApiError::validation(vec![FieldError {
                        field: "driver".to_string(),
                        message: "Assigned user is not a driver".to_string(),
                    }]));
                }
                Some(driver)
            }
            _ => None,
        };

        let changes = TripChanges {
            pick_up_address: payload
                .pick_up_address
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            drop_off_address: payload
                .drop_off_address
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            status: Some(status),
            driver_id: driver.map(|d| d.id),
        };
        let trip = self
            .trips
            .update(&trip_id, changes)
            .await?
            .ok_or_else(|| ApiError::not_found("Trip not found"))?;

        tracing::info!(
            trip_id = %trip.id,
            by = %identity.id,
            status = trip.status.as_str(),
            "trip updated"
        );

        let view = self.view(&trip).await?;
        let data = serde_json::to_value(&view).map_err(|_| ApiError::internal("serialization"))?;
        self.bus
            .publish(&trip.id, Envelope::new(TYPE_TRIP_UPDATED, data))
            .await;
        Ok(())
    }

    /// Resolve rider/driver references into identity summaries. A dangling
    /// reference renders as null rather than failing the whole view.
    pub async fn view(&self, trip: &Trip) -> Result<TripView, ApiError> {
        let rider = self.summarize(&trip.rider_id).await?;
        let driver = match &trip.driver_id {
            Some(id) => self.summarize(id).await?,
            None => None,
        };
        Ok(TripView::new(trip, rider, driver))
    }

    async fn summarize(&self, user_id: &str) -> Result<Option<UserSummary>, ApiError> {
        Ok(self.users.get(user_id).await?.map(|user| user.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{GroupMember, InMemoryBus};
    use crate::db::trips::MemoryTrips;
    use crate::db::users::MemoryUsers;
    use crate::models::user::User;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Harness {
        dispatcher: TripDispatcher,
        bus: Arc<InMemoryBus>,
        users: Arc<MemoryUsers>,
        trips: Arc<MemoryTrips>,
    }

    fn harness() -> Harness {
        let users = Arc::new(MemoryUsers::new());
        let trips = Arc::new(MemoryTrips::new());
        let bus = Arc::new(InMemoryBus::new());
        let dispatcher = TripDispatcher::new(users.clone(), trips.clone(), bus.clone());
        Harness {
            dispatcher,
            bus,
            users,
            trips,
        }
    }

    async fn seed_user(users: &MemoryUsers, username: &str, role: Role) -> User {
        users
            .create(User {
                id: User::generate(),
                username: username.to_string(),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                role,
                password_hash: "unused".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn probe(bus: &InMemoryBus, group: &str) -> mpsc::Receiver<Arc<Envelope>> {
        let (tx, rx) = mpsc::channel(8);
        bus.join(
            group,
            GroupMember {
                session_id: format!("probe_{group}"),
                sender: tx,
            },
        )
        .await;
        rx
    }

    #[tokio::test]
    async fn create_trip_persists_confirms_and_alerts_driver_pool() {
        let h = harness();
        let rider = seed_user(&h.users, "rider.one", Role::Rider).await;
        let mut pool = probe(&h.bus, DRIVER_POOL).await;

        let reply = h
            .dispatcher
            .create_trip(
                &rider.summary(),
                json!({ "pick_up_address": "1 Main St", "drop_off_address": "9 Dock Rd" }),
            )
            .await
            .unwrap();

        assert_eq!(reply.kind, TYPE_TRIP_CREATED);
        let id = reply.data["id"].as_str().unwrap();
        assert!(id.starts_with("trip_"));
        assert_eq!(reply.data["pick_up_address"], "1 Main St");
        assert_eq!(reply.data["drop_off_address"], "9 Dock Rd");
        assert_eq!(reply.data["status"], "REQUESTED");
        assert!(reply.data["driver"].is_null());
        assert_eq!(reply.data["rider"]["username"], "rider.one");

        let broadcast = pool.recv().await.unwrap();
        assert_eq!(broadcast.kind, TYPE_TRIP_CREATED);
        assert_eq!(broadcast.data, reply.data);

        let stored = h.trips.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TripStatus::Requested);
        assert_eq!(stored.rider_id, rider.id);
        assert!(stored.driver_id.is_none());
    }

    #[tokio::test]
    async fn create_trip_accepts_explicit_matching_rider() {
        let h = harness();
        let rider = seed_user(&h.users, "rider.one", Role::Rider).await;

        let reply = h
            .dispatcher
            .create_trip(
                &rider.summary(),
                json!({
                    "pick_up_address": "1 Main St",
                    "drop_off_address": "9 Dock Rd",
                    "rider": rider.id,
                }),
            )
            .await
            .unwrap();
        assert_eq!(reply.data["rider"]["id"], rider.id.as_str());
    }

    #[tokio::test]
    async fn create_trip_rejects_missing_addresses() {
        let h = harness();
        let rider = seed_user(&h.users, "rider.one", Role::Rider).await;
        let mut pool = probe(&h.bus, DRIVER_POOL).await;

        let err = h
            .dispatcher
            .create_trip(&rider.summary(), json!({ "pick_up_address": "  " }))
            .await
            .unwrap_err();

        assert_eq!(err.code, "VALIDATION_ERROR");
        let fields: Vec<_> = err
            .details
            .unwrap()
            .into_iter()
            .map(|f| f.field)
            .collect();
        assert!(fields.contains(&"pick_up_address".to_string()));
        assert!(fields.contains(&"drop_off_address".to_string()));
        assert!(pool.try_recv().is_err(), "no broadcast on failure");
    }

    #[tokio::test]
    async fn create_trip_rejects_foreign_rider() {
        let h = harness();
        let rider = seed_user(&h.users, "rider.one", Role::Rider).await;

        let err = h
            .dispatcher
            .create_trip(
                &rider.summary(),
                json!({
                    "pick_up_address": "1 Main St",
                    "drop_off_address": "9 Dock Rd",
                    "rider": "usr_someone_else",
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert_eq!(err.details.unwrap()[0].field, "rider");
    }

    #[tokio::test]
    async fn create_trip_rejects_non_object_payload() {
        let h = harness();
        let rider = seed_user(&h.users, "rider.one", Role::Rider).await;

        let err = h
            .dispatcher
            .create_trip(&rider.summary(), json!("not an object"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "BAD_REQUEST");
    }

    #[tokio::test]
    async fn update_trip_broadcasts_to_trip_group() {
        let h = harness();
        let rider = seed_user(&h.users, "rider.one", Role::Rider).await;
        let driver = seed_user(&h.users, "driver.one", Role::Driver).await;

        let reply = h
            .dispatcher
            .create_trip(
                &rider.summary(),
                json!({ "pick_up_address": "1 Main St", "drop_off_address": "9 Dock Rd" }),
            )
            .await
            .unwrap();
        let trip_id = reply.data["id"].as_str().unwrap().to_string();
        let mut group = probe(&h.bus, &trip_id).await;

        h.dispatcher
            .update_trip(
                &driver.summary(),
                json!({ "id": trip_id, "status": "IN_PROGRESS", "driver": driver.id }),
            )
            .await
            .unwrap();

        let broadcast = group.recv().await.unwrap();
        assert_eq!(broadcast.kind, TYPE_TRIP_UPDATED);
        assert_eq!(broadcast.data["status"], "IN_PROGRESS");
        assert_eq!(broadcast.data["driver"]["username"], "driver.one");
        assert_eq!(broadcast.data["rider"]["username"], "rider.one");

        let stored = h.trips.get(&trip_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TripStatus::InProgress);
        assert_eq!(stored.driver_id.as_deref(), Some(driver.id.as_str()));
    }

    #[tokio::test]
    async fn update_trip_unknown_id_is_not_found() {
        let h = harness();
        let driver = seed_user(&h.users, "driver.one", Role::Driver).await;

        let err = h
            .dispatcher
            .update_trip(
                &driver.summary(),
                json!({ "id": "trip_does_not_exist", "status": "IN_PROGRESS" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn update_trip_requires_id_and_status() {
        let h = harness();
        let driver = seed_user(&h.users, "driver.one", Role::Driver).await;

        let err = h
            .dispatcher
            .update_trip(&driver.summary(), json!({ "status": "IN_PROGRESS" }))
            .await
            .unwrap_err();
        assert_eq!(err.details.unwrap()[0].field, "id");

        let err = h
            .dispatcher
            .update_trip(&driver.summary(), json!({ "id": "trip_x" }))
            .await
            .unwrap_err();
        assert_eq!(err.details.unwrap()[0].field, "status");
    }

    #[tokio::test]
    async fn update_trip_rejects_rider_as_driver() {
        let h = harness();
        let rider = seed_user(&h.users, "rider.one", Role::Rider).await;
        let other = seed_user(&h.users, "rider.two", Role::Rider).await;

        let reply = h
            .dispatcher
            .create_trip(
                &rider.summary(),
                json!({ "pick_up_address": "1 Main St", "drop_off_address": "9 Dock Rd" }),
            )
            .await
            .unwrap();
        let trip_id = reply.data["id"].as_str().unwrap();

        let err = h
            .dispatcher
            .update_trip(
                &rider.summary(),
                json!({ "id": trip_id, "status": "ACCEPTED", "driver": other.id }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert_eq!(err.details.unwrap()[0].field, "driver");

        let stored = h.trips.get(trip_id).await.unwrap().unwrap();
        assert!(stored.driver_id.is_none(), "repository unchanged on failure");
    }

    #[tokio::test]
    async fn update_trip_rejects_unknown_driver() {
        let h = harness();
        let rider = seed_user(&h.users, "rider.one", Role::Rider).await;

        let reply = h
            .dispatcher
            .create_trip(
                &rider.summary(),
                json!({ "pick_up_address": "1 Main St", "drop_off_address": "9 Dock Rd" }),
            )
            .await
            .unwrap();
        let trip_id = reply.data["id"].as_str().unwrap();

        let err = h
            .dispatcher
            .update_trip(
                &rider.summary(),
                json!({ "id": trip_id, "status": "ACCEPTED", "driver": "usr_ghost" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.details.unwrap()[0].field, "driver");
    }

    #[tokio::test]
    async fn update_trip_rejects_backward_transition() {
        let h = harness();
        let rider = seed_user(&h.users, "rider.one", Role::Rider).await;
        let driver = seed_user(&h.users, "driver.one", Role::Driver).await;

        let reply = h
            .dispatcher
            .create_trip(
                &rider.summary(),
                json!({ "pick_up_address": "1 Main St", "drop_off_address": "9 Dock Rd" }),
            )
            .await
            .unwrap();
        let trip_id = reply.data["id"].as_str().unwrap().to_string();

        h.dispatcher
            .update_trip(
                &driver.summary(),
                json!({ "id": trip_id, "status": "IN_PROGRESS", "driver": driver.id }),
            )
            .await
            .unwrap();

        let err = h
            .dispatcher
            .update_trip(
                &driver.summary(),
                json!({ "id": trip_id, "status": "REQUESTED" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, "BAD_REQUEST");

        let stored = h.trips.get(&trip_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TripStatus::InProgress);
    }
}

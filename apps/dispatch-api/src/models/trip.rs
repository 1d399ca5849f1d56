use chrono::{DateTime, Utc};
use ridewire_common::id::{prefix, PrefixedId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::user::UserSummary;

/// Trip lifecycle, in order. A trip never moves back to an earlier status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Requested,
    Accepted,
    Started,
    InProgress,
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Requested => "REQUESTED",
            TripStatus::Accepted => "ACCEPTED",
            TripStatus::Started => "STARTED",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TripStatus::Requested => 0,
            TripStatus::Accepted => 1,
            TripStatus::Started => 2,
            TripStatus::InProgress => 3,
            TripStatus::Completed => 4,
        }
    }

    /// Forward-only transition check. Re-writing the current status is
    /// allowed; moving backwards is not.
    pub fn can_transition_to(&self, next: TripStatus) -> bool {
        next.rank() >= self.rank()
    }
}

/// A trip record as persisted.
#[derive(Debug, Clone)]
pub struct Trip {
    pub id: String,
    pub pick_up_address: String,
    pub drop_off_address: String,
    pub status: TripStatus,
    pub rider_id: String,
    pub driver_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrefixedId for Trip {
    const PREFIX: &'static str = prefix::TRIP;
}

/// Serialized trip shape with rider and driver resolved to identity
/// summaries. This is what goes over the wire, both on the gateway and on
/// the HTTP surface.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TripView {
    pub id: String,
    pub pick_up_address: String,
    pub drop_off_address: String,
    pub status: TripStatus,
    pub rider: Option<UserSummary>,
    pub driver: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripView {
    pub fn new(trip: &Trip, rider: Option<UserSummary>, driver: Option<UserSummary>) -> Self {
        Self {
            id: trip.id.clone(),
            pick_up_address: trip.pick_up_address.clone(),
            drop_off_address: trip.drop_off_address.clone(),
            status: trip.status,
            rider,
            driver,
            created_at: trip.created_at,
            updated_at: trip.updated_at,
        }
    }
}

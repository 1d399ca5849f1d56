use chrono::{DateTime, Utc};
use ridewire_common::id::{prefix, PrefixedId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Account role. Decides which groups a session joins at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rider,
    Driver,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rider" => Some(Role::Rider),
            "driver" => Some(Role::Driver),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Rider => "rider",
            Role::Driver => "driver",
        }
    }
}

/// A registered account as persisted. Never serialized to clients directly;
/// use [`UserSummary`] for anything that leaves the server.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl PrefixedId for User {
    const PREFIX: &'static str = prefix::USER;
}

impl User {
    /// Public shape embedded in trip views and registration responses.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
        }
    }
}

/// Public identity summary.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

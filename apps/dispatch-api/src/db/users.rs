use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::models::user::User;

/// Abstraction over account storage.
///
/// Backed by an in-memory map in the single-process deployment; a durable
/// implementation plugs in behind the same trait.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Fails with a conflict if the username is already
    /// taken (case-insensitive).
    async fn create(&self, user: User) -> Result<User, ApiError>;
    async fn get(&self, id: &str) -> Result<Option<User>, ApiError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

pub struct MemoryUsers {
    // Single lock so the uniqueness check and the insert are one unit.
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn create(&self, user: User) -> Result<User, ApiError> {
        let mut users = self.users.lock();
        if users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(ApiError::conflict("Username is already taken"));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get(&self, id: &str) -> Result<Option<User>, ApiError> {
        Ok(self.users.lock().get(id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }
}

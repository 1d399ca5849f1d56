//! Per-connection session state.
//!
//! A session owns the authenticated identity, the set of groups it has
//! joined, and the sending half of its mailbox. The connection task is the
//! only owner, so membership bookkeeping needs no interior locking; the bus
//! side holds cloned [`GroupMember`] handles.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::bus::{GroupBus, GroupMember};
use crate::gateway::envelope::Envelope;
use crate::models::user::UserSummary;
use ridewire_common::id::{prefix, prefixed_ulid};

pub struct Session {
    pub session_id: String,
    pub identity: UserSummary,
    groups: HashSet<String>,
    sender: mpsc::Sender<Arc<Envelope>>,
    bus: Arc<dyn GroupBus>,
}

impl Session {
    pub fn new(
        identity: UserSummary,
        sender: mpsc::Sender<Arc<Envelope>>,
        bus: Arc<dyn GroupBus>,
    ) -> Self {
        Self {
            session_id: prefixed_ulid(prefix::SESSION),
            identity,
            groups: HashSet::new(),
            sender,
            bus,
        }
    }

    /// Delivery handle registered with the bus for this session.
    pub fn member(&self) -> GroupMember {
        GroupMember {
            session_id: self.session_id.clone(),
            sender: self.sender.clone(),
        }
    }

    /// Join a group, tracking it for cleanup on disconnect. Joining a group
    /// twice is a no-op.
    pub async fn join(&mut self, group: &str) {
        if self.groups.insert(group.to_string()) {
            self.bus.join(group, self.member()).await;
            tracing::debug!(
                session_id = %self.session_id,
                user_id = %self.identity.id,
                group,
                "session joined group"
            );
        }
    }

    /// Leave every joined group. Called once when the connection closes;
    /// calling it again is harmless.
    pub async fn leave_all(&mut self) {
        for group in std::mem::take(&mut self.groups) {
            self.bus.leave(&group, &self.session_id).await;
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

//! Group-addressed publish/subscribe for gateway sessions.
//!
//! Groups are plain strings. They materialize when the first member joins
//! and are dropped again when the last member leaves, so one-off trip groups
//! never accumulate. All membership changes and publishes to a group are
//! serialized under that group's lock, which gives per-group FIFO delivery
//! and keeps joins/leaves atomic with respect to concurrent publishes.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::gateway::envelope::Envelope;

/// Capacity of each session's outbound mailbox. A publish to a member whose
/// mailbox is full is dropped for that member; the publisher never blocks.
pub const MAILBOX_CAPACITY: usize = 256;

/// Delivery handle for one session: envelopes published to a group are
/// queued on the member's mailbox and drained onto the socket by the
/// session's own task.
#[derive(Clone)]
pub struct GroupMember {
    pub session_id: String,
    pub sender: mpsc::Sender<Arc<Envelope>>,
}

/// The pub/sub seam injected into every session and the dispatch logic.
///
/// The in-memory implementation below is authoritative for a single
/// process; a cross-process bus plugs in behind the same trait.
#[async_trait]
pub trait GroupBus: Send + Sync {
    /// Subscribe a session to a group, materializing the group on first use.
    /// Re-joining replaces the member's delivery handle.
    async fn join(&self, group: &str, member: GroupMember);
    /// Remove a session from a group. Unknown groups and non-members are a
    /// no-op.
    async fn leave(&self, group: &str, session_id: &str);
    /// Deliver an envelope to every current member of a group, in publish
    /// order. Publishing to an absent group is a silent no-op.
    async fn publish(&self, group: &str, envelope: Envelope);
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GroupState {
    members: Vec<GroupMember>,
}

/// Uses `DashMap` for shard-level concurrency and `parking_lot::Mutex` per
/// group for non-poisoning, fast locking.
pub struct InMemoryBus {
    groups: DashMap<String, Mutex<GroupState>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Number of sessions currently subscribed to a group.
    pub fn member_count(&self, group: &str) -> usize {
        self.groups
            .get(group)
            .map(|entry| entry.lock().members.len())
            .unwrap_or(0)
    }

    /// Whether the group is currently materialized.
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Drop the group entry if its member set is empty. Checked again under
    /// the shard lock, so a concurrent join wins over the removal.
    fn collect_if_empty(&self, group: &str) {
        self.groups
            .remove_if(group, |_, state| state.lock().members.is_empty());
    }
}

#[async_trait]
impl GroupBus for InMemoryBus {
    async fn join(&self, group: &str, member: GroupMember) {
        let entry = self
            .groups
            .entry(group.to_string())
            .or_insert_with(|| Mutex::new(GroupState::default()));
        let mut state = entry.lock();
        match state
            .members
            .iter_mut()
            .find(|m| m.session_id == member.session_id)
        {
            Some(existing) => *existing = member,
            None => state.members.push(member),
        }
    }

    async fn leave(&self, group: &str, session_id: &str) {
        let mut now_empty = false;
        if let Some(entry) = self.groups.get(group) {
            let mut state = entry.lock();
            state.members.retain(|m| m.session_id != session_id);
            now_empty = state.members.is_empty();
        }
        if now_empty {
            self.collect_if_empty(group);
        }
    }

    async fn publish(&self, group: &str, envelope: Envelope) {
        let mut now_empty = false;
        if let Some(entry) = self.groups.get(group) {
            let payload = Arc::new(envelope);
            let mut state = entry.lock();
            state.members.retain(|member| {
                match member.sender.try_send(payload.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            group,
                            session_id = %member.session_id,
                            "session mailbox full, dropping delivery"
                        );
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        // Session is gone; prune it rather than keep failing.
                        false
                    }
                }
            });
            now_empty = state.members.is_empty();
        }
        if now_empty {
            self.collect_if_empty(group);
        }
    }
}

//! Remote cursor store — last known event per remote participant.
//!
//! DESIGN
//! ======
//! The table is owned and mutated only through `apply`; consumers get
//! immutable `Arc` snapshots, either on demand or pushed through a `watch`
//! channel whenever the table changes.
//!
//! Conflict rule is arrival order: each event for an id overwrites the
//! previous one unconditionally, even when its `timestamp` is older. A late
//! packet can therefore show a stale position until the next one lands.
//!
//! Entries are never expired implicitly. `evict_idle` exists for hosts that
//! want a last-seen timeout, but nothing in this crate calls it on its own,
//! so a long-lived room with churn grows without bound.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::event::{CursorEvent, ParticipantId};

/// Immutable view of the remote cursor table. Events are shared with the
/// store, so publishing a snapshot copies pointers, not event bodies.
pub type CursorSnapshot = Arc<HashMap<ParticipantId, Arc<CursorEvent>>>;

/// What `apply` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// First event from this participant.
    Inserted,
    /// Replaced the participant's previous event.
    Updated,
    /// The event carried the local session id and was discarded.
    IgnoredSelf,
}

pub struct RemoteCursorStore {
    self_id: ParticipantId,
    cursors: HashMap<ParticipantId, Arc<CursorEvent>>,
    /// Local arrival time per entry, used only by `evict_idle`.
    last_seen: HashMap<ParticipantId, Instant>,
    snapshots: watch::Sender<CursorSnapshot>,
}

impl RemoteCursorStore {
    /// Store for a local participant whose own events must never appear.
    #[must_use]
    pub fn new(self_id: ParticipantId) -> Self {
        let (snapshots, _) = watch::channel(CursorSnapshot::default());
        Self { self_id, cursors: HashMap::new(), last_seen: HashMap::new(), snapshots }
    }

    #[must_use]
    pub fn self_id(&self) -> &ParticipantId {
        &self.self_id
    }

    /// Merge one event. Self-originated events are dropped; everything else
    /// overwrites the sender's entry.
    pub fn apply(&mut self, event: CursorEvent) -> Applied {
        self.apply_at(event, Instant::now())
    }

    fn apply_at(&mut self, event: CursorEvent, now: Instant) -> Applied {
        let purged_self = self.purge_self();

        if event.participant.id == self.self_id {
            if purged_self {
                self.publish();
            }
            return Applied::IgnoredSelf;
        }

        let id = event.participant.id.clone();
        self.last_seen.insert(id.clone(), now);
        let outcome = if self.cursors.insert(id, Arc::new(event)).is_some() { Applied::Updated } else { Applied::Inserted };
        self.publish();
        outcome
    }

    /// Parse and merge a raw transport payload. Malformed payloads are logged
    /// and dropped; the table is untouched.
    pub fn receive(&mut self, payload: &serde_json::Value) -> Option<Applied> {
        match CursorEvent::from_payload(payload) {
            Ok(event) => Some(self.apply(event)),
            Err(e) => {
                warn!(error = %e, "store: dropping malformed cursor payload");
                None
            }
        }
    }

    /// Current table. Reflects every `apply` made before the call.
    #[must_use]
    pub fn snapshot(&self) -> CursorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified on every table change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CursorSnapshot> {
        self.snapshots.subscribe()
    }

    #[must_use]
    pub fn get(&self, id: &ParticipantId) -> Option<&CursorEvent> {
        self.cursors.get(id).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Drop entries whose last event arrived more than `max_idle` ago.
    /// Returns how many were removed.
    pub fn evict_idle(&mut self, max_idle: Duration) -> usize {
        self.evict_idle_at(Instant::now(), max_idle)
    }

    fn evict_idle_at(&mut self, now: Instant, max_idle: Duration) -> usize {
        let idle = self
            .last_seen
            .iter()
            .filter_map(|(id, seen)| (now.duration_since(*seen) > max_idle).then(|| id.clone()))
            .collect::<Vec<_>>();
        for id in &idle {
            self.last_seen.remove(id);
            self.cursors.remove(id);
        }
        if !idle.is_empty() {
            debug!(evicted = idle.len(), remaining = self.cursors.len(), "store: evicted idle cursors");
            self.publish();
        }
        idle.len()
    }

    fn purge_self(&mut self) -> bool {
        self.last_seen.remove(&self.self_id);
        self.cursors.remove(&self.self_id).is_some()
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.cursors.clone()));
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

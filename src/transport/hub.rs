//! In-process room registry.
//!
//! DESIGN
//! ======
//! Rooms map subscriber ids to bounded `mpsc` senders. A room exists while it
//! has at least one subscriber and is dropped with its last one. Publishing
//! is best effort: a full subscriber queue skips that subscriber, a closed
//! one is pruned on the spot. Senders do not hear their own broadcasts
//! unless the hub is built with [`LocalHub::with_self_echo`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DEFAULT_SUBSCRIBER_CAPACITY, Envelope, Subscription, Transport, TransportError};

type Room = HashMap<Uuid, mpsc::Sender<Envelope>>;

#[derive(Clone)]
pub struct LocalHub {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
    capacity: usize,
    self_echo: bool,
}

impl LocalHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Hub whose subscriber queues hold at most `capacity` envelopes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), capacity: capacity.max(1), self_echo: false }
    }

    /// Deliver broadcasts back to their sender as well.
    #[must_use]
    pub fn with_self_echo(mut self) -> Self {
        self.self_echo = true;
        self
    }

    /// Number of live subscribers in `room`.
    #[must_use]
    pub fn subscriber_count(&self, room: &str) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms.get(room).map_or(0, HashMap::len)
    }

    /// Names of rooms with at least one subscriber.
    #[must_use]
    pub fn rooms(&self) -> Vec<String> {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms.keys().cloned().collect()
    }

    fn join(&self, room: &str) -> Result<Subscription, TransportError> {
        if room.trim().is_empty() {
            return Err(TransportError::InvalidRoom(room.to_owned()));
        }
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.capacity);

        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let subscribers = rooms.entry(room.to_owned()).or_default();
        subscribers.insert(id, tx);
        info!(%room, subscription = %id, subscribers = subscribers.len(), "hub: subscribed");
        Ok(Subscription { id, inbound: rx })
    }

    fn broadcast(&self, room: &str, from: Uuid, envelope: &Envelope) -> Result<(), TransportError> {
        let mut closed = Vec::new();
        {
            let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
            let Some(subscribers) = rooms.get(room) else {
                return Err(TransportError::NotSubscribed(from));
            };
            if !subscribers.contains_key(&from) {
                return Err(TransportError::NotSubscribed(from));
            }

            for (id, tx) in subscribers {
                if *id == from && !self.self_echo {
                    continue;
                }
                match tx.try_send(envelope.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        debug!(%room, subscription = %id, "hub: subscriber queue full, skipped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
            for id in closed {
                remove_subscriber(&mut rooms, room, id);
            }
        }
        Ok(())
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_subscriber(rooms: &mut HashMap<String, Room>, room: &str, id: Uuid) {
    let Some(subscribers) = rooms.get_mut(room) else {
        return;
    };
    if subscribers.remove(&id).is_some() {
        info!(%room, subscription = %id, remaining = subscribers.len(), "hub: unsubscribed");
    }
    if subscribers.is_empty() {
        rooms.remove(room);
        debug!(%room, "hub: room emptied");
    }
}

#[async_trait::async_trait]
impl Transport for LocalHub {
    async fn subscribe(&self, room: &str) -> Result<Subscription, TransportError> {
        self.join(room)
    }

    fn publish(&self, room: &str, from: Uuid, envelope: Envelope) -> Result<(), TransportError> {
        self.broadcast(room, from, &envelope)
    }

    fn unsubscribe(&self, room: &str, subscription: Uuid) {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        remove_subscriber(&mut rooms, room, subscription);
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;

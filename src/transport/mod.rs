//! Transport seam — room-scoped publish/subscribe.
//!
//! ARCHITECTURE
//! ============
//! The channel binding only needs three primitives from whatever actually
//! moves bytes: subscribe to a room, publish an envelope to a room, and
//! unsubscribe. Delivery is best effort with no ordering or acknowledgment
//! contract. `LocalHub` serves in-process rooms (and backs the relay server);
//! `WsTransport` reaches a relay over WebSocket.

pub mod hub;
pub mod ws;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

pub use hub::LocalHub;
pub use ws::WsTransport;

/// Default bounded queue size per subscriber.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

// =============================================================================
// TYPES
// =============================================================================

/// One tagged broadcast. The transport never inspects `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn broadcast(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { event: event.into(), payload }
    }
}

/// A live room subscription: an id for publish/unsubscribe and the inbound
/// envelope queue.
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub inbound: mpsc::Receiver<Envelope>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid room name: {0:?}")]
    InvalidRoom(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("subscription not found: {0}")]
    NotSubscribed(Uuid),
    #[error("outbound queue full")]
    QueueFull,
    #[error("transport closed")]
    Closed,
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Join `room`. Inbound envelopes arrive on the returned subscription.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the subscription cannot be established.
    async fn subscribe(&self, room: &str) -> Result<Subscription, TransportError>;

    /// Fire-and-forget send to every other subscriber of `room`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the envelope could not be handed off.
    /// Callers are free to ignore it.
    fn publish(&self, room: &str, from: Uuid, envelope: Envelope) -> Result<(), TransportError>;

    /// Leave `room`. Unknown ids are ignored.
    fn unsubscribe(&self, room: &str, subscription: Uuid);
}

// =============================================================================
// TEST HELPERS
// =============================================================================

//! Channel binding — one room-scoped broadcast channel per adapter.
//!
//! DESIGN
//! ======
//! `Unopened → Opening → Open → Closed`. The binding subscribes to the room
//! on `open`, pumps inbound envelopes of the cursor-move kind into a single
//! registered handler, and hands out a clonable [`ChannelHandle`] for the
//! publish path. `Closed` is terminal.
//!
//! ERROR HANDLING
//! ==============
//! A failed subscribe is returned to the caller and the binding falls back
//! to `Unopened`; nothing is retried here. Publishing outside `Open` is
//! dropped with a debug log: a stale cursor position is not worth reporting.
//! The publish path holds the state lock across the transport hand-off, so
//! once `close` returns no further transport publish can start.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::{CURSOR_MOVE_EVENT, CursorEvent};
use crate::transport::{Envelope, Transport, TransportError};

type MessageHandler = Box<dyn FnMut(serde_json::Value) + Send>;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unopened,
    Opening,
    Open,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel open failed: {0}")]
    Open(#[source] TransportError),
    #[error("channel is closed")]
    Closed,
    #[error("channel already bound to room {room:?}")]
    AlreadyBound { room: String },
}

struct Shared {
    state: ChannelState,
    room: Option<String>,
    subscription: Option<Uuid>,
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// HANDLE
// =============================================================================

/// Publish side of an open channel. Cheap to clone; every clone observes the
/// binding's state, so publishing through a handle after `close` is a no-op.
#[derive(Clone)]
pub struct ChannelHandle {
    room: String,
    transport: Arc<dyn Transport>,
    shared: Arc<Mutex<Shared>>,
}

impl ChannelHandle {
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        lock_shared(&self.shared).state == ChannelState::Open
    }

    /// Fire-and-forget broadcast of one cursor event.
    pub fn publish(&self, event: &CursorEvent) {
        let payload = match event.to_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "channel: failed to serialize cursor event");
                return;
            }
        };

        let shared = lock_shared(&self.shared);
        let Some(subscription) = shared.subscription.filter(|_| shared.state == ChannelState::Open) else {
            debug!(room = %self.room, state = ?shared.state, "channel: publish outside open state dropped");
            return;
        };
        let envelope = Envelope::broadcast(CURSOR_MOVE_EVENT, payload);
        if let Err(e) = self.transport.publish(&self.room, subscription, envelope) {
            debug!(room = %self.room, error = %e, "channel: publish dropped");
        }
    }
}

// =============================================================================
// BINDING
// =============================================================================

pub struct ChannelBinding {
    transport: Arc<dyn Transport>,
    shared: Arc<Mutex<Shared>>,
    handler: Arc<Mutex<Option<MessageHandler>>>,
    listener: Option<JoinHandle<()>>,
}

impl ChannelBinding {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            shared: Arc::new(Mutex::new(Shared { state: ChannelState::Unopened, room: None, subscription: None })),
            handler: Arc::new(Mutex::new(None)),
            listener: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        lock_shared(&self.shared).state
    }

    #[must_use]
    pub fn room(&self) -> Option<String> {
        lock_shared(&self.shared).room.clone()
    }

    /// Register the inbound handler. Receives the raw payload of each
    /// cursor-move envelope, in transport delivery order. A later call
    /// replaces the earlier handler.
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: FnMut(serde_json::Value) + Send + 'static,
    {
        let mut slot = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("channel: replacing existing message handler");
        }
        *slot = Some(Box::new(handler));
    }

    /// Subscribe to `room`. Calling again with the same room while open
    /// returns another handle to the same subscription.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Open`] if the transport refuses the subscription.
    /// - [`ChannelError::Closed`] if the binding was closed.
    /// - [`ChannelError::AlreadyBound`] if open on a different room.
    pub async fn open(&mut self, room: &str) -> Result<ChannelHandle, ChannelError> {
        {
            let mut shared = lock_shared(&self.shared);
            match shared.state {
                ChannelState::Closed => return Err(ChannelError::Closed),
                ChannelState::Open => {
                    let bound = shared.room.clone().unwrap_or_default();
                    if bound == room {
                        return Ok(self.handle(bound));
                    }
                    return Err(ChannelError::AlreadyBound { room: bound });
                }
                ChannelState::Unopened | ChannelState::Opening => {}
            }
            shared.state = ChannelState::Opening;
            shared.room = Some(room.to_owned());
        }

        let subscription = match self.transport.subscribe(room).await {
            Ok(s) => s,
            Err(e) => {
                let mut shared = lock_shared(&self.shared);
                if shared.state == ChannelState::Opening {
                    shared.state = ChannelState::Unopened;
                    shared.room = None;
                }
                warn!(%room, error = %e, "channel: open failed");
                return Err(ChannelError::Open(e));
            }
        };

        {
            let mut shared = lock_shared(&self.shared);
            if shared.state == ChannelState::Closed {
                self.transport.unsubscribe(room, subscription.id);
                return Err(ChannelError::Closed);
            }
            shared.state = ChannelState::Open;
            shared.subscription = Some(subscription.id);
        }

        info!(%room, subscription = %subscription.id, "channel: opened");
        self.listener = Some(spawn_listener(
            subscription.inbound,
            Arc::clone(&self.handler),
            Arc::clone(&self.shared),
        ));
        Ok(self.handle(room.to_owned()))
    }

    /// Publish through the bound channel; a no-op unless open.
    pub fn publish(&self, event: &CursorEvent) {
        let Some(room) = self.room() else {
            debug!("channel: publish before open dropped");
            return;
        };
        self.handle(room).publish(event);
    }

    /// Unsubscribe and release the channel. Safe from any state, idempotent,
    /// and terminal.
    pub fn close(&mut self) {
        let (previous, room, subscription) = {
            let mut shared = lock_shared(&self.shared);
            let previous = shared.state;
            shared.state = ChannelState::Closed;
            (previous, shared.room.clone(), shared.subscription.take())
        };
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let (Some(room), Some(subscription)) = (room.as_deref(), subscription) {
            self.transport.unsubscribe(room, subscription);
        }
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous != ChannelState::Closed {
            info!(room = room.as_deref().unwrap_or("-"), from = ?previous, "channel: closed");
        }
    }

    fn handle(&self, room: String) -> ChannelHandle {
        ChannelHandle { room, transport: Arc::clone(&self.transport), shared: Arc::clone(&self.shared) }
    }
}

impl Drop for ChannelBinding {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_listener(
    mut inbound: mpsc::Receiver<Envelope>,
    handler: Arc<Mutex<Option<MessageHandler>>>,
    shared: Arc<Mutex<Shared>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = inbound.recv().await {
            if lock_shared(&shared).state != ChannelState::Open {
                break;
            }
            if envelope.event != CURSOR_MOVE_EVENT {
                debug!(event = %envelope.event, "channel: ignoring envelope of other kind");
                continue;
            }
            let mut slot = handler.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(handler) = slot.as_mut() {
                handler(envelope.payload);
            }
        }
    })
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod tests;

//! Local input adapter — wires pointer samples to the room and the room to
//! the remote cursor table.
//!
//! ARCHITECTURE
//! ============
//! ```text
//! pointer mpsc ─▶ input task ─▶ Throttle ─▶ ChannelHandle::publish ─▶ Transport
//! Transport ─▶ channel listener ─▶ RemoteCursorStore::receive ─▶ watch snapshots
//! ```
//!
//! The store is owned by the channel's message handler, so only the listener
//! task mutates it. Readers go through the `watch` receiver.
//!
//! LIFECYCLE
//! =========
//! `deactivate` runs in a fixed order: cancel the throttle (drops any parked
//! sample and its timer), stop the input task, close the channel. Each step
//! is idempotent, and a failed `activate` tears down whatever it built
//! before returning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{ChannelBinding, ChannelError};
use crate::config::{ConfigError, CursorConfig};
use crate::event::{CursorEvent, Position};
use crate::identity::Session;
use crate::store::{CursorSnapshot, RemoteCursorStore};
use crate::throttle::Throttle;
use crate::transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ChannelOpen(#[from] ChannelError),
}

pub struct LocalInputAdapter {
    session: Session,
    room: String,
    binding: ChannelBinding,
    throttle: Arc<Throttle<CursorEvent>>,
    input: Option<JoinHandle<()>>,
    snapshots: watch::Receiver<CursorSnapshot>,
    active: bool,
}

impl LocalInputAdapter {
    /// Join `config.room_name` as a fresh participant and start forwarding
    /// samples from `pointer_rx`.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::Config`] if the config is invalid.
    /// - [`AdapterError::ChannelOpen`] if the room subscription fails.
    pub async fn activate(
        config: CursorConfig,
        transport: Arc<dyn Transport>,
        pointer_rx: mpsc::Receiver<Position>,
    ) -> Result<Self, AdapterError> {
        let session = Session::new(config.username.clone());
        Self::activate_with_session(config, session, transport, pointer_rx).await
    }

    /// Like [`activate`](Self::activate), for a caller-supplied identity.
    ///
    /// # Errors
    ///
    /// Same as [`activate`](Self::activate).
    pub async fn activate_with_session(
        config: CursorConfig,
        session: Session,
        transport: Arc<dyn Transport>,
        pointer_rx: mpsc::Receiver<Position>,
    ) -> Result<Self, AdapterError> {
        config.validate()?;

        let mut store = RemoteCursorStore::new(session.id().clone());
        let snapshots = store.subscribe();

        let mut binding = ChannelBinding::new(transport);
        binding.on_message(move |payload| {
            store.receive(&payload);
        });

        let handle = match binding.open(&config.room_name).await {
            Ok(handle) => handle,
            Err(e) => {
                binding.close();
                return Err(AdapterError::ChannelOpen(e));
            }
        };

        let throttle = Arc::new(Throttle::new(Duration::from_millis(config.throttle_ms), move |event: CursorEvent| {
            handle.publish(&event);
        }));
        let input = spawn_input(pointer_rx, session.clone(), Arc::clone(&throttle));

        info!(
            room = %config.room_name,
            participant = %session.id(),
            throttle_ms = config.throttle_ms,
            "adapter: activated"
        );
        Ok(Self {
            session,
            room: config.room_name,
            binding,
            throttle,
            input: Some(input),
            snapshots,
            active: true,
        })
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current remote cursor table. Never contains the local participant.
    #[must_use]
    pub fn snapshot(&self) -> CursorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified whenever the remote cursor table changes.
    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<CursorSnapshot> {
        self.snapshots.clone()
    }

    /// Stop publishing and leave the room. Parked samples are discarded,
    /// not flushed.
    pub fn deactivate(&mut self) {
        self.throttle.cancel();
        if let Some(input) = self.input.take() {
            input.abort();
        }
        self.binding.close();
        if std::mem::take(&mut self.active) {
            info!(room = %self.room, participant = %self.session.id(), "adapter: deactivated");
        }
    }
}

impl Drop for LocalInputAdapter {
    fn drop(&mut self) {
        self.deactivate();
    }
}

fn spawn_input(
    mut pointer_rx: mpsc::Receiver<Position>,
    session: Session,
    throttle: Arc<Throttle<CursorEvent>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(position) = pointer_rx.recv().await {
            throttle.submit(CursorEvent::from_session(&session, position));
        }
        debug!(participant = %session.id(), "adapter: pointer stream ended");
    })
}

#[cfg(test)]
#[path = "adapter_test.rs"]
mod tests;

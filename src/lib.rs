//! Shared live cursors for a named room.
//!
//! ARCHITECTURE
//! ============
//! ```text
//! LocalInputAdapter → Throttle → ChannelBinding::publish → Transport
//! Transport → ChannelBinding::on_message → RemoteCursorStore::apply → snapshot
//! ```
//!
//! `transport` is the only seam to the outside world. `relay` is the server
//! side of `WsTransport`, shipped as the `live-cursors` binary.

pub mod adapter;
pub mod channel;
pub mod config;
pub mod event;
pub mod identity;
pub mod relay;
pub mod store;
pub mod throttle;
pub mod transport;

pub use adapter::{AdapterError, LocalInputAdapter};
pub use channel::{ChannelBinding, ChannelError, ChannelHandle, ChannelState};
pub use config::{ConfigError, CursorConfig, RelayConfig};
pub use event::{CURSOR_MOVE_EVENT, CursorEvent, MalformedMessage, Participant, ParticipantId, Position};
pub use identity::Session;
pub use store::{Applied, CursorSnapshot, RemoteCursorStore};
pub use throttle::Throttle;
pub use transport::{Envelope, LocalHub, Subscription, Transport, TransportError, WsTransport};

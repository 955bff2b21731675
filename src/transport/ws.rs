//! WebSocket client transport for the relay server.
//!
//! DESIGN
//! ======
//! Each subscription owns one socket at `{base}/realtime/{room}` and one pump
//! task. The task forwards queued outbound envelopes to the socket and parsed
//! inbound text frames to the subscription queue. Removing the outbound
//! sender (unsubscribe) ends the task, which closes the socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DEFAULT_SUBSCRIBER_CAPACITY, Envelope, Subscription, Transport, TransportError};

#[derive(Clone)]
pub struct WsTransport {
    base_url: String,
    capacity: usize,
    links: Arc<Mutex<HashMap<Uuid, mpsc::Sender<Envelope>>>>,
}

impl WsTransport {
    /// `base_url` may use `ws(s)://` or `http(s)://`; the latter is rewritten.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: ws_base_url(&base_url.into()),
            capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            links: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn room_url(&self, room: &str) -> String {
        format!("{}/realtime/{}", self.base_url, encode_path_segment(room))
    }
}

/// Normalize a base URL to a websocket scheme without a trailing slash.
pub(crate) fn ws_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_owned()
    }
}

/// Bytes escaped in a room path segment: everything outside the unreserved
/// set `A-Z a-z 0-9 - _ . ~`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

pub(crate) fn encode_path_segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_SEGMENT).to_string()
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn subscribe(&self, room: &str) -> Result<Subscription, TransportError> {
        if room.trim().is_empty() {
            return Err(TransportError::InvalidRoom(room.to_owned()));
        }
        let url = self.room_url(room);
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let id = Uuid::new_v4();
        let (inbound_tx, inbound_rx) = mpsc::channel::<Envelope>(self.capacity);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(self.capacity);
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, outbound_tx);
        let links = Arc::clone(&self.links);
        let room_name = room.to_owned();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    out = outbound_rx.recv() => {
                        let Some(envelope) = out else {
                            let _ = sink.close().await;
                            break;
                        };
                        let text = match serde_json::to_string(&envelope) {
                            Ok(t) => t,
                            Err(e) => {
                                warn!(error = %e, "ws transport: failed to serialize envelope");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    msg = source.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => match serde_json::from_str::<Envelope>(text.as_str()) {
                                Ok(envelope) => {
                                    if inbound_tx.send(envelope).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!(room = %room_name, error = %e, "ws transport: invalid inbound frame"),
                            },
                            Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }
            links
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            debug!(room = %room_name, subscription = %id, "ws transport: socket closed");
        });

        info!(%room, subscription = %id, url = %url, "ws transport: subscribed");
        Ok(Subscription { id, inbound: inbound_rx })
    }

    fn publish(&self, _room: &str, from: Uuid, envelope: Envelope) -> Result<(), TransportError> {
        let links = self.links.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = links.get(&from) else {
            return Err(TransportError::NotSubscribed(from));
        };
        tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn unsubscribe(&self, room: &str, subscription: Uuid) {
        let removed = self
            .links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscription);
        if removed.is_some() {
            info!(%room, %subscription, "ws transport: unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_base_url_rewrites_http_schemes() {
        assert_eq!(ws_base_url("http://127.0.0.1:3000/"), "ws://127.0.0.1:3000");
        assert_eq!(ws_base_url("https://relay.example.com"), "wss://relay.example.com");
        assert_eq!(ws_base_url("ws://host:1"), "ws://host:1");
    }

    #[test]
    fn encode_path_segment_escapes_reserved_bytes() {
        assert_eq!(encode_path_segment("macrodata_refinement_office"), "macrodata_refinement_office");
        assert_eq!(encode_path_segment("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_path_segment("é"), "%C3%A9");
        assert_eq!(encode_path_segment("r-1_a.b~c"), "r-1_a.b~c");
        assert_eq!(encode_path_segment("r?x=1#y"), "r%3Fx%3D1%23y");
    }

    #[test]
    fn room_url_joins_base_and_room() {
        let transport = WsTransport::new("http://localhost:3000");
        assert_eq!(transport.room_url("r 1"), "ws://localhost:3000/realtime/r%201");
    }

    #[tokio::test]
    async fn publish_without_subscription_is_rejected() {
        let transport = WsTransport::new("ws://127.0.0.1:9");
        let id = Uuid::new_v4();
        let envelope = Envelope::broadcast("realtime-cursor-move", serde_json::Value::Null);
        assert!(matches!(transport.publish("r1", id, envelope), Err(TransportError::NotSubscribed(_))));
    }

    #[tokio::test]
    async fn subscribe_rejects_blank_room_before_connecting() {
        let transport = WsTransport::new("ws://127.0.0.1:9");
        assert!(matches!(transport.subscribe(" ").await, Err(TransportError::InvalidRoom(_))));
    }
}

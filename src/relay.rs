//! Relay server — room-scoped WebSocket broadcast.
//!
//! DESIGN
//! ======
//! Each connection to `/realtime/{room}` joins the room on a shared
//! [`LocalHub`] and enters a `select!` loop:
//! - Incoming text frames → parse as `Envelope` → publish to room peers
//! - Envelopes from peers → forward to the socket
//!
//! The relay never looks inside payloads. A frame that is not an envelope is
//! dropped with a warning and the connection stays up.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → subscribe to the room
//! 2. Relay frames until the client closes or the socket errors
//! 3. Unsubscribe

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::transport::{Envelope, LocalHub, Transport};

// =============================================================================
// STATE
// =============================================================================

#[derive(Clone)]
pub struct RelayState {
    pub hub: LocalHub,
}

impl RelayState {
    #[must_use]
    pub fn new(config: &RelayConfig) -> Self {
        Self { hub: LocalHub::with_capacity(config.subscriber_capacity) }
    }
}

// =============================================================================
// ROUTER
// =============================================================================

pub fn app(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/realtime/{room}", get(handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

// =============================================================================
// UPGRADE
// =============================================================================

async fn handle_ws(State(state): State<RelayState>, Path(room): Path<String>, ws: WebSocketUpgrade) -> Response {
    if room.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "room required").into_response();
    }
    ws.on_upgrade(move |socket| run_ws(socket, state, room))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: RelayState, room: String) {
    let mut subscription = match state.hub.subscribe(&room).await {
        Ok(s) => s,
        Err(e) => {
            warn!(%room, error = %e, "relay: subscribe failed");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let client_id = subscription.id;
    info!(%room, %client_id, "relay: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => relay_frame(&state, &room, client_id, text.as_str()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(envelope) = subscription.inbound.recv() => {
                let text = match serde_json::to_string(&envelope) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(%room, error = %e, "relay: failed to serialize envelope");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.unsubscribe(&room, client_id);
    info!(%room, %client_id, "relay: client disconnected");
}

/// Parse one client frame and broadcast it to the sender's room peers.
fn relay_frame(state: &RelayState, room: &str, client_id: Uuid, text: &str) {
    let envelope = match serde_json::from_str::<Envelope>(text) {
        Ok(e) => e,
        Err(e) => {
            warn!(%room, %client_id, error = %e, "relay: invalid frame dropped");
            return;
        }
    };
    if let Err(e) = state.hub.publish(room, client_id, envelope) {
        debug!(%room, %client_id, error = %e, "relay: publish dropped");
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;

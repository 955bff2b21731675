use super::*;
use crate::event::{ParticipantId, Position};
use crate::identity::Session;
use crate::transport::LocalHub;
use crate::transport::test_helpers::RecordingTransport;
use serde_json::json;
use tokio::time::{Duration, sleep, timeout};

fn event(x: f64, y: f64) -> CursorEvent {
    let session = Session::from_parts(ParticipantId::new("local"), "Mark", "hsl(1, 100%, 70%)");
    CursorEvent::at(&session, Position::new(x, y), 1)
}

fn collecting_handler(binding: &mut ChannelBinding) -> mpsc::UnboundedReceiver<serde_json::Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    binding.on_message(move |payload| {
        let _ = tx.send(payload);
    });
    rx
}

async fn recv_payload(rx: &mut mpsc::UnboundedReceiver<serde_json::Value>) -> serde_json::Value {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("payload receive timed out")
        .expect("handler channel closed")
}

#[tokio::test]
async fn new_binding_is_unopened() {
    let binding = ChannelBinding::new(Arc::new(RecordingTransport::default()));
    assert_eq!(binding.state(), ChannelState::Unopened);
    assert!(binding.room().is_none());
}

#[tokio::test]
async fn open_transitions_to_open_and_binds_room() {
    let mut binding = ChannelBinding::new(Arc::new(RecordingTransport::default()));
    let handle = binding.open("r1").await.unwrap();
    assert_eq!(binding.state(), ChannelState::Open);
    assert_eq!(binding.room().as_deref(), Some("r1"));
    assert_eq!(handle.room(), "r1");
    assert!(handle.is_open());
}

#[tokio::test]
async fn open_is_idempotent_for_same_room() {
    let transport = LocalHub::new();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    binding.open("r1").await.unwrap();
    binding.open("r1").await.unwrap();
    assert_eq!(transport.subscriber_count("r1"), 1);
}

#[tokio::test]
async fn open_on_other_room_is_rejected() {
    let mut binding = ChannelBinding::new(Arc::new(RecordingTransport::default()));
    binding.open("r1").await.unwrap();
    assert!(matches!(
        binding.open("r2").await,
        Err(ChannelError::AlreadyBound { room }) if room == "r1"
    ));
}

#[tokio::test]
async fn open_failure_is_reported_and_not_retried() {
    let transport = RecordingTransport::failing();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    let err = binding.open("r1").await.err().expect("open should fail");
    assert!(matches!(err, ChannelError::Open(TransportError::Connect(_))));
    assert_eq!(binding.state(), ChannelState::Unopened);
    assert!(binding.room().is_none());
}

#[tokio::test]
async fn publish_outside_open_never_reaches_transport() {
    let transport = RecordingTransport::default();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    binding.publish(&event(1.0, 1.0));
    assert_eq!(transport.published_count(), 0);

    binding.close();
    binding.publish(&event(2.0, 2.0));
    assert_eq!(transport.published_count(), 0);
}

#[tokio::test]
async fn publish_sends_cursor_move_envelope() {
    let transport = RecordingTransport::default();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    let handle = binding.open("r1").await.unwrap();

    handle.publish(&event(10.0, 20.0));

    let published = transport.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    let (room, _, envelope) = &published[0];
    assert_eq!(room, "r1");
    assert_eq!(envelope.event, CURSOR_MOVE_EVENT);
    assert_eq!(envelope.payload["position"]["x"], 10.0);
    assert_eq!(envelope.payload["user"]["id"], "local");
}

#[tokio::test]
async fn handle_publish_after_close_is_silent_noop() {
    let transport = RecordingTransport::default();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    let handle = binding.open("r1").await.unwrap();
    binding.close();

    handle.publish(&event(1.0, 1.0));
    assert!(!handle.is_open());
    assert_eq!(transport.published_count(), 0);
}

#[tokio::test]
async fn inbound_cursor_moves_reach_handler_in_delivery_order() {
    let transport = RecordingTransport::default();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    let mut rx = collecting_handler(&mut binding);
    binding.open("r1").await.unwrap();

    for n in 0..3 {
        transport
            .deliver(Envelope::broadcast(CURSOR_MOVE_EVENT, json!({ "n": n })))
            .await;
    }

    for n in 0..3 {
        assert_eq!(recv_payload(&mut rx).await["n"], n);
    }
}

#[tokio::test]
async fn inbound_envelopes_of_other_kinds_are_ignored() {
    let transport = RecordingTransport::default();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    let mut rx = collecting_handler(&mut binding);
    binding.open("r1").await.unwrap();

    transport
        .deliver(Envelope::broadcast("presence-sync", json!({ "n": 0 })))
        .await;
    transport
        .deliver(Envelope::broadcast(CURSOR_MOVE_EVENT, json!({ "n": 1 })))
        .await;

    assert_eq!(recv_payload(&mut rx).await["n"], 1);
}

#[tokio::test]
async fn later_handler_replaces_earlier_one() {
    let transport = RecordingTransport::default();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    let mut first = collecting_handler(&mut binding);
    let mut second = collecting_handler(&mut binding);
    binding.open("r1").await.unwrap();

    transport
        .deliver(Envelope::broadcast(CURSOR_MOVE_EVENT, json!({ "n": 1 })))
        .await;

    assert_eq!(recv_payload(&mut second).await["n"], 1);
    assert!(first.recv().await.is_none(), "replaced handler was dropped");
}

#[tokio::test]
async fn close_unsubscribes_and_stops_delivery() {
    let transport = RecordingTransport::default();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    let mut rx = collecting_handler(&mut binding);
    binding.open("r1").await.unwrap();

    binding.close();
    assert_eq!(binding.state(), ChannelState::Closed);
    assert_eq!(transport.unsubscribed.lock().unwrap().len(), 1);

    sleep(Duration::from_millis(10)).await;
    assert!(rx.recv().await.is_none(), "handler is released on close");
}

#[tokio::test]
async fn close_is_idempotent_and_safe_before_open() {
    let transport = RecordingTransport::default();
    let mut binding = ChannelBinding::new(Arc::new(transport.clone()));
    binding.close();
    binding.close();
    assert_eq!(binding.state(), ChannelState::Closed);
    assert!(transport.unsubscribed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn closed_binding_cannot_reopen() {
    let mut binding = ChannelBinding::new(Arc::new(RecordingTransport::default()));
    binding.open("r1").await.unwrap();
    binding.close();
    assert!(matches!(binding.open("r1").await, Err(ChannelError::Closed)));
}

#[tokio::test]
async fn drop_closes_subscription() {
    let hub = LocalHub::new();
    {
        let mut binding = ChannelBinding::new(Arc::new(hub.clone()));
        binding.open("r1").await.unwrap();
        assert_eq!(hub.subscriber_count("r1"), 1);
    }
    assert_eq!(hub.subscriber_count("r1"), 0);
}

#[tokio::test]
async fn two_bindings_exchange_cursor_events_over_hub() {
    let hub = LocalHub::new();
    let mut a = ChannelBinding::new(Arc::new(hub.clone()));
    let mut b = ChannelBinding::new(Arc::new(hub.clone()));
    let mut rx_a = collecting_handler(&mut a);
    let mut rx_b = collecting_handler(&mut b);
    let handle_a = a.open("r1").await.unwrap();
    b.open("r1").await.unwrap();

    handle_a.publish(&event(3.0, 4.0));

    let payload = recv_payload(&mut rx_b).await;
    assert_eq!(payload["position"]["y"], 4.0);
    assert!(
        timeout(Duration::from_millis(50), rx_a.recv()).await.is_err(),
        "sender does not hear itself by default"
    );
}

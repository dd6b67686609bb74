//! Integration tests for the realtime channel, run against a local
//! WebSocket server that scripts the backend's side of the protocol.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use telecare_events::EventBus;
use telecare_realtime::{
    Callback, ChannelConfig, RealtimeChannel, ReconnectPolicy, StaticTokenSource,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Scripted server
// ---------------------------------------------------------------------------

/// What the server observed, tagged with the connection number.
#[derive(Debug)]
enum ServerEvent {
    Connected(u32),
    /// A JSON text frame from the client.
    Frame(u32, serde_json::Value),
    Closed(u32),
}

struct TestServer {
    /// `ws://` URL of the listener.
    url: String,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    /// Text frames to send to the currently-open connection.
    pushes: mpsc::UnboundedSender<String>,
}

impl TestServer {
    async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(RECV_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for a server event")
            .expect("server task ended early")
    }

    fn push(&self, frame: serde_json::Value) {
        self.pushes
            .send(frame.to_string())
            .expect("server task ended early");
    }
}

/// Start a WebSocket server that accepts connections one at a time,
/// records every client frame, and replies `authorized` to each
/// opening batch. The first `drop_connections` connections are dropped
/// right after being authorized, to exercise the reconnect path.
async fn spawn_server(drop_connections: u32) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (event_tx, events) = mpsc::unbounded_channel();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let mut conn_no = 0u32;
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws_stream) = accept_async(socket).await else {
                continue;
            };
            let _ = event_tx.send(ServerEvent::Connected(conn_no));
            let (mut sink, mut stream) = ws_stream.split();

            loop {
                tokio::select! {
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text)
                            else {
                                continue;
                            };
                            let is_batch = value.is_array();
                            let _ = event_tx.send(ServerEvent::Frame(conn_no, value));
                            if is_batch {
                                if sink
                                    .send(Message::Text("authorized".into()))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                                if conn_no < drop_connections {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                            let _ = event_tx.send(ServerEvent::Closed(conn_no));
                            break;
                        }
                        Some(Ok(_)) => {}
                    },
                    push = push_rx.recv() => match push {
                        Some(text) => {
                            let _ = sink.send(Message::Text(text)).await;
                        }
                        None => return,
                    },
                }
            }

            conn_no += 1;
        }
    });

    TestServer {
        url,
        events,
        pushes: push_tx,
    }
}

fn channel(url: &str) -> RealtimeChannel {
    let mut config = ChannelConfig::new(url);
    config.ping_interval = Duration::from_secs(60);
    config.reconnect = ReconnectPolicy::new(Duration::from_millis(50));
    RealtimeChannel::new(
        config,
        Arc::new(StaticTokenSource::new("tok-9")),
        Arc::new(EventBus::default()),
    )
}

/// Callback that forwards every payload into a channel the test can
/// await on.
fn forwarding_callback() -> (Callback, mpsc::UnboundedReceiver<serde_json::Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: Callback = Arc::new(move |data| {
        let _ = tx.send(data);
    });
    (callback, rx)
}

async fn next_data(rx: &mut mpsc::UnboundedReceiver<serde_json::Value>) -> serde_json::Value {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a delivery")
        .expect("callback channel closed")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// The first track opens the connection and sends the connect message
/// plus every registered track as a single batch.
#[tokio::test]
async fn open_batch_carries_token_and_tracks() {
    let mut server = spawn_server(0).await;
    let channel = channel(&server.url);
    let (callback, _rx) = forwarding_callback();

    channel.track("monolith", "user-1", callback);

    assert!(matches!(server.next_event().await, ServerEvent::Connected(0)));
    let ServerEvent::Frame(0, batch) = server.next_event().await else {
        panic!("Expected the opening batch");
    };
    let batch = batch.as_array().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0]["_type"], "connect");
    assert_eq!(batch[0]["key"], "tok-9");
    assert_eq!(batch[1]["_type"], "track");
    assert_eq!(batch[1]["service"], "monolith");
    assert_eq!(batch[1]["key"], "user-1");
}

/// Routed pushes reach the callback registered for their key.
#[tokio::test]
async fn pushes_route_to_the_subscribed_callback() {
    let mut server = spawn_server(0).await;
    let channel = channel(&server.url);
    let (callback, mut deliveries) = forwarding_callback();

    channel.track("monolith", "user-1", callback);
    assert!(matches!(server.next_event().await, ServerEvent::Connected(0)));
    assert!(matches!(server.next_event().await, ServerEvent::Frame(0, _)));

    server.push(serde_json::json!({
        "service": "monolith",
        "key": "user-1",
        "data": {"type": "claim_removed", "customerId": 500}
    }));

    let data = next_data(&mut deliveries).await;
    assert_eq!(data["customerId"], 500);
}

/// After an unexpected close, the channel reconnects on its own and
/// re-tracks every key without the caller re-invoking `track`.
#[tokio::test]
async fn reconnect_preserves_subscriptions() {
    let mut server = spawn_server(1).await;
    let channel = channel(&server.url);
    let (callback, mut deliveries) = forwarding_callback();

    channel.track("monolith", "user-1", callback);
    assert!(matches!(server.next_event().await, ServerEvent::Connected(0)));
    assert!(matches!(server.next_event().await, ServerEvent::Frame(0, _)));

    // The server drops connection 0 after authorizing it. The channel
    // must come back by itself and re-send the track.
    assert!(matches!(server.next_event().await, ServerEvent::Connected(1)));
    let ServerEvent::Frame(1, batch) = server.next_event().await else {
        panic!("Expected a fresh opening batch");
    };
    let batch = batch.as_array().unwrap();
    assert_eq!(batch[1]["_type"], "track");
    assert_eq!(batch[1]["key"], "user-1");

    // The re-tracked subscription is live.
    server.push(serde_json::json!({
        "service": "monolith",
        "key": "user-1",
        "data": {"n": 7}
    }));
    assert_eq!(next_data(&mut deliveries).await["n"], 7);
}

/// Two callbacks share a key: removing one keeps delivery to the other
/// and sends no wire untrack; removing the last sends exactly one
/// untrack and closes the connection for good.
#[tokio::test]
async fn untrack_is_reference_counted() {
    let mut server = spawn_server(0).await;
    let channel = channel(&server.url);
    let (cb1, mut deliveries1) = forwarding_callback();
    let (cb2, mut deliveries2) = forwarding_callback();

    let sub1 = channel.track("monolith", "user-1", cb1);
    let sub2 = channel.track("monolith", "user-1", cb2);
    assert!(matches!(server.next_event().await, ServerEvent::Connected(0)));
    assert!(matches!(server.next_event().await, ServerEvent::Frame(0, _)));

    channel.untrack(&sub1);

    // Still delivering to the surviving callback, and no untrack has
    // crossed the wire yet.
    server.push(serde_json::json!({
        "service": "monolith",
        "key": "user-1",
        "data": {"n": 1}
    }));
    assert_eq!(next_data(&mut deliveries2).await["n"], 1);
    assert!(deliveries1.try_recv().is_err());

    channel.untrack(&sub2);

    let ServerEvent::Frame(0, frame) = server.next_event().await else {
        panic!("Expected the untrack frame");
    };
    assert_eq!(frame["_type"], "untrack");
    assert_eq!(frame["service"], "monolith");
    assert_eq!(frame["key"], "user-1");
    assert!(matches!(server.next_event().await, ServerEvent::Closed(0)));
}

/// The close caused by the last untrack is terminal: no reconnect.
#[tokio::test]
async fn last_untrack_closes_without_reconnect() {
    let mut server = spawn_server(0).await;
    let channel = channel(&server.url);
    let (callback, _rx) = forwarding_callback();

    let sub = channel.track("monolith", "user-1", callback);
    assert!(matches!(server.next_event().await, ServerEvent::Connected(0)));
    assert!(matches!(server.next_event().await, ServerEvent::Frame(0, _)));

    channel.untrack(&sub);
    assert!(matches!(server.next_event().await, ServerEvent::Frame(0, _))); // untrack
    assert!(matches!(server.next_event().await, ServerEvent::Closed(0)));

    // Well past the 50ms reconnect delay: nothing should dial in.
    let quiet = tokio::time::timeout(Duration::from_millis(300), server.events.recv()).await;
    assert!(quiet.is_err(), "channel reconnected after a deliberate close");
}

/// The keep-alive ping goes out on the configured interval.
#[tokio::test]
async fn keep_alive_ping_is_sent() {
    let mut server = spawn_server(0).await;
    let mut config = ChannelConfig::new(&server.url);
    config.ping_interval = Duration::from_millis(100);
    config.reconnect = ReconnectPolicy::new(Duration::from_millis(50));
    let channel = RealtimeChannel::new(
        config,
        Arc::new(StaticTokenSource::new("tok-9")),
        Arc::new(EventBus::default()),
    );
    let (callback, _rx) = forwarding_callback();

    channel.track("monolith", "user-1", callback);
    assert!(matches!(server.next_event().await, ServerEvent::Connected(0)));
    assert!(matches!(server.next_event().await, ServerEvent::Frame(0, _)));

    let ServerEvent::Frame(0, frame) = server.next_event().await else {
        panic!("Expected the keep-alive ping");
    };
    assert_eq!(frame["_type"], "ping");
}

/// Tracking a second key on a live, authorized connection sends an
/// individual track message instead of a new batch.
#[tokio::test]
async fn late_track_is_sent_individually() {
    let mut server = spawn_server(0).await;
    let channel = channel(&server.url);
    let (cb1, _rx1) = forwarding_callback();
    let (cb2, mut deliveries2) = forwarding_callback();

    channel.track("monolith", "user-1", cb1);
    assert!(matches!(server.next_event().await, ServerEvent::Connected(0)));
    assert!(matches!(server.next_event().await, ServerEvent::Frame(0, _)));

    channel.track("csr", "queue", cb2);

    let ServerEvent::Frame(0, frame) = server.next_event().await else {
        panic!("Expected an individual track frame");
    };
    assert_eq!(frame["_type"], "track");
    assert_eq!(frame["service"], "csr");
    assert_eq!(frame["key"], "queue");

    server.push(serde_json::json!({
        "service": "csr",
        "key": "queue",
        "data": {"n": 2}
    }));
    assert_eq!(next_data(&mut deliveries2).await["n"], 2);
}

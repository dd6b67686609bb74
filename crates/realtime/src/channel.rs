//! The realtime channel: one WebSocket connection multiplexing every
//! subscription.
//!
//! [`RealtimeChannel`] owns the subscription table and at most one
//! connection task. The first [`track`](RealtimeChannel::track) spawns
//! the task; the task performs the handshake (one-time token, then
//! `connect_async`), sends the opening batch, buffers outbound
//! messages until the server replies `authorized`, and then routes
//! inbound pushes to subscribers until the connection ends.
//!
//! An unexpected close while subscriptions remain is transient: the
//! task waits out the reconnect policy and dials again, re-tracking
//! every registered key from the table without caller involvement.
//! The close triggered by the last untrack (or by
//! [`shutdown`](RealtimeChannel::shutdown)) is deliberate and final.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use telecare_events::{EventBus, NoticeLevel};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::messages::{open_batch, parse_server_message, ClientMessage, PushMessage, ServerMessage};
use crate::reconnect::ReconnectPolicy;
use crate::subscriptions::{Callback, RemovalEffect, SubscriberId, SubscriptionTable};
use crate::token::TokenSource;

/// Keep-alive interval; intermediaries drop idle connections well
/// above this.
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(300);

/// Errors from the realtime layer.
///
/// Connection failures never surface here: they are either retried by
/// the reconnect loop or, when transport-fatal, published as a notice.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Obtaining the one-time connection token failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),
}

/// Connection settings for the channel.
#[derive(Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint, e.g. `wss://host/ws`.
    pub ws_url: String,
    /// Keep-alive ping interval.
    pub ping_interval: Duration,
    /// Policy applied after an unexpected close.
    pub reconnect: ReconnectPolicy,
}

impl ChannelConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Handle for one registered callback, needed to untrack it.
#[derive(Debug, Clone)]
pub struct Subscription {
    service: String,
    key: String,
    id: SubscriberId,
}

impl Subscription {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Commands from the channel front end to its connection task.
enum Command {
    Send(ClientMessage),
    Close,
}

struct ConnHandle {
    tx: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    #[allow(dead_code)]
    task: JoinHandle<()>,
}

/// Single shared realtime connection, constructed once at application
/// start.
pub struct RealtimeChannel {
    table: Arc<Mutex<SubscriptionTable>>,
    bus: Arc<EventBus>,
    tokens: Arc<dyn TokenSource>,
    config: ChannelConfig,
    conn: Mutex<Option<ConnHandle>>,
}

impl RealtimeChannel {
    pub fn new(config: ChannelConfig, tokens: Arc<dyn TokenSource>, bus: Arc<EventBus>) -> Self {
        Self {
            table: Arc::new(Mutex::new(SubscriptionTable::new())),
            bus,
            tokens,
            config,
            conn: Mutex::new(None),
        }
    }

    /// Register a callback for a service key, connecting if needed.
    ///
    /// Multiple callbacks may share a key; each receives every message
    /// for it. Opening the connection is idempotent: concurrent tracks
    /// during setup reuse the task already being spawned.
    pub fn track(&self, service: &str, key: &str, callback: Callback) -> Subscription {
        let (id, first_for_key) = self
            .table
            .lock()
            .expect("subscription lock poisoned")
            .add(service, key, callback);

        let mut conn = self.conn.lock().expect("connection lock poisoned");
        let alive = conn.as_ref().is_some_and(|h| !h.tx.is_closed());
        if !alive {
            // The opening batch will carry every registered key,
            // including this one.
            *conn = Some(self.spawn_connection());
        } else if first_for_key {
            if let Some(handle) = conn.as_ref() {
                let _ = handle.tx.send(Command::Send(ClientMessage::track(service, key)));
            }
        }

        Subscription {
            service: service.to_string(),
            key: key.to_string(),
            id,
        }
    }

    /// Remove one callback registration.
    ///
    /// The last callback for a key sends the wire `untrack`; the last
    /// key across all services closes the connection for good.
    pub fn untrack(&self, subscription: &Subscription) {
        let effect = self
            .table
            .lock()
            .expect("subscription lock poisoned")
            .remove(&subscription.service, &subscription.key, subscription.id);

        let conn = self.conn.lock().expect("connection lock poisoned");
        let Some(handle) = conn.as_ref() else {
            return;
        };
        match effect {
            RemovalEffect::NotFound | RemovalEffect::CallbackRemoved => {}
            RemovalEffect::KeyRemoved => {
                let _ = handle.tx.send(Command::Send(ClientMessage::untrack(
                    &subscription.service,
                    &subscription.key,
                )));
            }
            RemovalEffect::TableEmpty => {
                let _ = handle.tx.send(Command::Send(ClientMessage::untrack(
                    &subscription.service,
                    &subscription.key,
                )));
                let _ = handle.tx.send(Command::Close);
            }
        }
    }

    /// Tear the connection down regardless of registered
    /// subscriptions. Called on sign-out.
    pub fn shutdown(&self) {
        let mut conn = self.conn.lock().expect("connection lock poisoned");
        if let Some(handle) = conn.take() {
            handle.cancel.cancel();
        }
    }

    /// Every `(service, key)` currently tracked.
    pub fn tracked_keys(&self) -> Vec<(String, String)> {
        self.table.lock().expect("subscription lock poisoned").keys()
    }

    fn spawn_connection(&self) -> ConnHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.table),
            Arc::clone(&self.bus),
            Arc::clone(&self.tokens),
            self.config.clone(),
            rx,
            cancel.clone(),
        ));
        ConnHandle { tx, cancel, task }
    }
}

/// How a single WebSocket session ended.
enum SessionEnd {
    /// Closed on purpose (last untrack); never reconnect.
    Deliberate,
    /// Shut down via the cancellation token.
    Cancelled,
    /// Dropped unexpectedly; reconnect while subscriptions remain.
    Lost,
}

enum FrameOutcome {
    Continue,
    Lost,
}

/// Core connection loop: handshake -> connect -> session -> reconnect.
async fn run_connection(
    table: Arc<Mutex<SubscriptionTable>>,
    bus: Arc<EventBus>,
    tokens: Arc<dyn TokenSource>,
    config: ChannelConfig,
    mut rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    loop {
        // Obtain the one-time token for this attempt.
        let token = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokens.connection_token() => match result {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(error = %e, "Realtime handshake failed");
                    if table.lock().expect("subscription lock poisoned").is_empty() {
                        return;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = config.reconnect.wait() => continue,
                    }
                }
            },
        };

        let ws_stream = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connect_async(config.ws_url.as_str()) => match result {
                Ok((ws_stream, _response)) => ws_stream,
                Err(e) if is_transport_fatal(&e) => {
                    bus.notice(
                        NoticeLevel::Error,
                        format!("Realtime connection unsupported: {e}"),
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Realtime connection failed");
                    if table.lock().expect("subscription lock poisoned").is_empty() {
                        return;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = config.reconnect.wait() => continue,
                    }
                }
            },
        };

        tracing::info!(url = %config.ws_url, "Realtime channel connected");

        match run_session(ws_stream, &token, &table, &bus, &config, &mut rx, &cancel).await {
            SessionEnd::Deliberate => {
                tracing::info!("Realtime channel closed, nothing left to track");
                return;
            }
            SessionEnd::Cancelled => return,
            SessionEnd::Lost => {
                if table.lock().expect("subscription lock poisoned").is_empty() {
                    return;
                }
                tracing::warn!(
                    delay_ms = config.reconnect.delay.as_millis() as u64,
                    "Realtime connection lost, reconnecting",
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = config.reconnect.wait() => {}
                }
            }
        }
    }
}

/// Drive one WebSocket session until it ends.
///
/// Sends the opening batch, then multiplexes outbound commands, the
/// keep-alive ticker, and inbound frames. Outbound messages are
/// buffered until the server replies `authorized`.
async fn run_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    token: &str,
    table: &Mutex<SubscriptionTable>,
    bus: &EventBus,
    config: &ChannelConfig,
    rx: &mut mpsc::UnboundedReceiver<Command>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = ws_stream.split();

    let keys = table.lock().expect("subscription lock poisoned").keys();
    if sink.send(Message::Text(open_batch(token, &keys))).await.is_err() {
        return SessionEnd::Lost;
    }

    let mut authorized = false;
    let mut pending: Vec<ClientMessage> = Vec::new();
    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + config.ping_interval,
        config.ping_interval,
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            _ = ping.tick() => {
                if send_message(&mut sink, &ClientMessage::Ping).await.is_err() {
                    return SessionEnd::Lost;
                }
            }
            command = rx.recv() => match command {
                Some(Command::Send(msg)) => {
                    if authorized {
                        if send_message(&mut sink, &msg).await.is_err() {
                            return SessionEnd::Lost;
                        }
                    } else {
                        pending.push(msg);
                    }
                }
                Some(Command::Close) | None => {
                    // Flush anything still buffered (the final untrack)
                    // before closing.
                    for msg in pending.drain(..) {
                        if send_message(&mut sink, &msg).await.is_err() {
                            return SessionEnd::Deliberate;
                        }
                    }
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Deliberate;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match handle_frame(&text, &mut sink, &mut authorized, &mut pending, table, bus)
                        .await
                    {
                        FrameOutcome::Continue => {}
                        FrameOutcome::Lost => return SessionEnd::Lost,
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        match handle_frame(
                            &text,
                            &mut sink,
                            &mut authorized,
                            &mut pending,
                            table,
                            bus,
                        )
                        .await
                        {
                            FrameOutcome::Continue => {}
                            FrameOutcome::Lost => return SessionEnd::Lost,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Discarding non-UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Backend closed realtime connection");
                    return SessionEnd::Lost;
                }
                Some(Ok(_)) => {
                    // Frame — ignore.
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Realtime receive error");
                    return SessionEnd::Lost;
                }
                None => {
                    tracing::info!("Realtime stream exhausted");
                    return SessionEnd::Lost;
                }
            },
        }
    }
}

/// Parse and react to one inbound text frame.
async fn handle_frame<S>(
    text: &str,
    sink: &mut S,
    authorized: &mut bool,
    pending: &mut Vec<ClientMessage>,
    table: &Mutex<SubscriptionTable>,
    bus: &EventBus,
) -> FrameOutcome
where
    S: SinkExt<Message, Error = tungstenite::Error> + Unpin,
{
    match parse_server_message(text) {
        Ok(ServerMessage::Authorized) => {
            tracing::debug!("Realtime connection authorized");
            *authorized = true;
            for msg in pending.drain(..) {
                if send_message(sink, &msg).await.is_err() {
                    return FrameOutcome::Lost;
                }
            }
            FrameOutcome::Continue
        }
        Ok(ServerMessage::Pong) => FrameOutcome::Continue,
        Ok(ServerMessage::Push(push)) => {
            route_push(table, bus, push);
            FrameOutcome::Continue
        }
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Unknown or malformed realtime frame");
            FrameOutcome::Continue
        }
    }
}

/// Deliver a push to every callback registered for its key.
///
/// Callbacks are cloned out before invocation so they are free to
/// track or untrack from inside the handler.
fn route_push(table: &Mutex<SubscriptionTable>, bus: &EventBus, push: PushMessage) {
    if let Some(error) = push.error {
        bus.notice(
            NoticeLevel::Error,
            format!("Realtime channel failed: {} ({})", error.msg, error.code),
        );
        return;
    }

    let callbacks = table
        .lock()
        .expect("subscription lock poisoned")
        .callbacks_for(&push.service, &push.key);
    if callbacks.is_empty() {
        tracing::debug!(service = %push.service, key = %push.key, "Push for untracked key");
        return;
    }
    for callback in callbacks {
        callback(push.data.clone());
    }
}

/// Send one message as a JSON text frame.
async fn send_message<S>(sink: &mut S, msg: &ClientMessage) -> Result<(), tungstenite::Error>
where
    S: SinkExt<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(msg.to_frame())).await
}

/// Whether a connection error means the transport itself is unusable,
/// as opposed to a transient failure worth retrying.
fn is_transport_fatal(error: &tungstenite::Error) -> bool {
    matches!(error, tungstenite::Error::Url(_))
}

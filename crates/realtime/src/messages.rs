//! Realtime channel wire messages.
//!
//! Outbound messages carry a `_type` tag. When a connection first
//! opens, the `connect` message and one `track` per registered key are
//! coalesced into a single JSON array sent as one text frame; after
//! that, messages are sent individually.
//!
//! Inbound frames are either the literal tokens `authorized` / `pong`
//! or a JSON object `{service, key, data}` routed to subscribers. An
//! inbound object carrying an `error` field is surfaced to the user
//! instead of being routed.

use serde::{Deserialize, Serialize};

/// Outbound messages to the realtime backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "_type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Authenticate the connection with a one-time handshake token.
    Connect { key: String },
    /// Ask the backend to start sending messages for a service key.
    Track { service: String, key: String },
    /// Stop sending messages for a service key.
    Untrack { service: String, key: String },
    /// Keep-alive no-op; the server replies `pong`.
    Ping,
}

impl ClientMessage {
    pub fn track(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Track {
            service: service.into(),
            key: key.into(),
        }
    }

    pub fn untrack(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Untrack {
            service: service.into(),
            key: key.into(),
        }
    }

    /// Serialize to a single text frame.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).expect("ClientMessage is always serialisable")
    }
}

/// Build the opening batch: the connect message followed by a track
/// for every `(service, key)` currently registered, as one JSON array.
pub fn open_batch(token: &str, keys: &[(String, String)]) -> String {
    let mut messages = Vec::with_capacity(keys.len() + 1);
    messages.push(ClientMessage::Connect {
        key: token.to_string(),
    });
    for (service, key) in keys {
        messages.push(ClientMessage::track(service.clone(), key.clone()));
    }
    serde_json::to_string(&messages).expect("ClientMessage batch is always serialisable")
}

/// A routed push or error from the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Present instead of routable content when the backend rejected
    /// something on this connection.
    #[serde(default)]
    pub error: Option<PushError>,
}

/// Error payload inside a push frame.
#[derive(Debug, Clone, Deserialize)]
pub struct PushError {
    pub code: i64,
    pub msg: String,
}

/// All inbound frames the channel understands.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// The server accepted the handshake token.
    Authorized,
    /// Keep-alive reply; discarded.
    Pong,
    /// A routed message (or connection-level error).
    Push(PushMessage),
}

/// Parse an inbound text frame.
///
/// Returns `Err` for frames that are neither a known literal token nor
/// a JSON object. Callers should log and continue.
pub fn parse_server_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    match text {
        "authorized" => Ok(ServerMessage::Authorized),
        "pong" => Ok(ServerMessage::Pong),
        _ => Ok(ServerMessage::Push(serde_json::from_str(text)?)),
    }
}

//! Realtime channel for the Telecare provider portal.
//!
//! Server-pushed events (claim transfers, claim removals) arrive over
//! a single persistent WebSocket connection that multiplexes any
//! number of `(service, key)` subscriptions:
//!
//! - [`messages`] — the wire frames in both directions.
//! - [`subscriptions`] — the reference-counted subscription table.
//! - [`channel`] — the connection state machine, keep-alive, and the
//!   fixed-interval reconnect loop.
//! - [`token`] — the one-time handshake token seam.

pub mod channel;
pub mod messages;
pub mod reconnect;
pub mod subscriptions;
pub mod token;

pub use channel::{ChannelConfig, RealtimeChannel, RealtimeError, Subscription};
pub use messages::{ClientMessage, PushMessage, ServerMessage};
pub use reconnect::ReconnectPolicy;
pub use subscriptions::{Callback, RemovalEffect, SubscriberId, SubscriptionTable};
pub use token::{StaticTokenSource, TokenSource};

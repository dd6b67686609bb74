//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for
//! [`PortalEvent`]s. It is designed to be shared via `Arc<EventBus>`
//! across the application; consumers call
//! [`subscribe`](EventBus::subscribe) and receive every event published
//! after that point.

use serde::Serialize;
use telecare_core::types::{Claim, CustomerId, UserProfile};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PortalEvent
// ---------------------------------------------------------------------------

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Error,
    Warning,
    Info,
}

/// A portal-level event. Each variant carries a fixed payload shape so
/// subscribers never have to re-parse loose JSON.
#[derive(Debug, Clone, Serialize)]
pub enum PortalEvent {
    /// A provider session was established and the user hydrated.
    SignedIn { user: UserProfile },

    /// The session ended — every service clears its local state.
    SignedOut,

    /// The inactivity warning stage fired; the UI should show the
    /// stay-signed-in interstitial.
    SignOutWarning,

    /// A claim entered the local list, whether self-claimed or pushed
    /// by a transfer.
    ClaimAdded { claim: Claim },

    /// A claim left the local list. `switch_view` tells the UI to
    /// navigate away if it is currently on this customer's page.
    ClaimRemoved {
        customer_id: CustomerId,
        switch_view: bool,
    },

    /// A transient user-facing notification.
    Notice {
        level: NoticeLevel,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`PortalEvent`].
pub struct EventBus {
    sender: broadcast::Sender<PortalEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed events are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: PortalEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Publish a user-facing notification.
    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.publish(PortalEvent::Notice {
            level,
            message: message.into(),
        });
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

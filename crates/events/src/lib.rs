//! Telecare in-process event infrastructure.
//!
//! The portal's three services (claim store, realtime channel,
//! inactivity monitor) are decoupled from each other and from their
//! consumers through a single publish/subscribe hub:
//!
//! - [`EventBus`] — fan-out hub backed by `tokio::sync::broadcast`.
//! - [`PortalEvent`] — the typed event set, one payload shape per
//!   variant.

pub mod bus;

pub use bus::{EventBus, NoticeLevel, PortalEvent};

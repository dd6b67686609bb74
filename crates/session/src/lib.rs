//! Session lifecycle for the Telecare provider portal.
//!
//! - [`monitor`] — the two-stage inactivity countdown
//!   (warning, then forced sign-out).
//! - [`manager`] — sign-in hydration and sign-out orchestration,
//!   including the monitor's transition wiring.

pub mod manager;
pub mod monitor;

pub use manager::SessionManager;
pub use monitor::{ActivityMonitor, Callbacks, SignoutCallback, WarningCallback};

use telecare_rest::RestError;

/// Errors from the session layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A configuration value was invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A session endpoint failed.
    #[error(transparent)]
    Rest(#[from] RestError),
}

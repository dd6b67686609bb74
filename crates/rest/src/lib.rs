//! REST client for the Telecare backend.
//!
//! Wraps the backend's request/response services behind [`BackendClient`]:
//!
//! - [`envelope`] — the `{error, warning, data}` response envelope and
//!   the backend error codes the portal reacts to specially.
//! - [`client`] — the HTTP client itself, including the activity hook
//!   (every user-initiated request resets the inactivity timer) and the
//!   session-fatal 401 / no-session handling.
//! - [`journal`] — fire-and-forget mirroring of user-initiated requests
//!   to the backend's request journal.
//! - [`session`] — typed session endpoints (sign-in hydration, sign-out,
//!   realtime handshake token).

pub mod client;
pub mod envelope;
pub mod journal;
pub mod session;

pub use client::{require_data, ActivityHook, BackendClient, RequestOptions, RestError};
pub use envelope::{codes, ApiError, ApiResponse};
pub use session::{SessionInfo, SessionUser};

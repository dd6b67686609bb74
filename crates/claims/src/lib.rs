//! Claim lifecycle for the Telecare provider portal.
//!
//! A claim is a provider's exclusive working lock on one customer,
//! enforced by the backend and mirrored locally:
//!
//! - [`api`] — the claims REST endpoints behind the [`ClaimsBackend`]
//!   seam.
//! - [`store`] — the local claim list with its dedup and idempotence
//!   guarantees.
//! - [`remote`] — server-pushed claim events from the realtime
//!   channel.
//! - [`notes`] — file-backed unread-notes flags per customer.

pub mod api;
pub mod notes;
pub mod remote;
pub mod store;

pub use api::{ClaimsApi, ClaimsBackend};
pub use notes::{NotesError, UnreadNotes};
pub use remote::{parse_event, RemoteClaimEvent};
pub use store::{AddOutcome, ClaimError, ClaimStore};

//! Server-pushed claim events.
//!
//! The realtime channel delivers claim notifications as JSON objects
//! with the shape `{"type": "<kind>", ...}`. This module deserializes
//! them into a strongly-typed [`RemoteClaimEvent`] enum.
//!
//! The `claim_transfered` wire name is the backend's spelling and must
//! not be corrected.

use serde::Deserialize;
use telecare_core::types::{Claim, CustomerId};

/// All known claim push notifications.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RemoteClaimEvent {
    /// Another provider transferred one of their claims to us.
    #[serde(rename = "claim_transfered")]
    ClaimTransfered { claim: Claim },

    /// A claim of ours was removed on the backend.
    #[serde(rename = "claim_removed")]
    ClaimRemoved {
        #[serde(rename = "customerId")]
        customer_id: CustomerId,
    },
}

/// Parse a realtime push payload into a typed event.
///
/// Returns `Err` for unknown `type` values or malformed payloads.
/// Callers should log unknown types and continue.
pub fn parse_event(data: serde_json::Value) -> Result<RemoteClaimEvent, serde_json::Error> {
    serde_json::from_value(data)
}

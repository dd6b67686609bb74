//! Core domain types shared across the portal crates.

use serde::{Deserialize, Serialize};

/// Backend customer ids are 64-bit integers.
pub type CustomerId = i64;

/// Provider / support-agent account id.
pub type ProviderId = i64;

/// Which order queue a claim belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    /// Erectile dysfunction order.
    Ed,
    /// Hormone replacement therapy order.
    Hrt,
    /// View-only claim, not tied to a specific order.
    View,
}

impl ClaimType {
    /// Lowercase wire/route segment for this claim type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Ed => "ed",
            ClaimType::Hrt => "hrt",
            ClaimType::View => "view",
        }
    }
}

/// Reason reported to the backend when a claim is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveReason {
    /// The order was approved and prescribed.
    Approved,
    /// The order was declined.
    Declined,
    /// The claim was handed to another provider or agent.
    Transferred,
    /// The order is closed or invalid.
    Closed,
    /// The order was rejected outright.
    Rejected,
}

/// A provider's exclusive working lock on one customer.
///
/// The backend is the source of truth for whether a customer is claimed
/// by anyone; the local list mirrors only "claimed by me".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub customer_id: CustomerId,
    /// `None` denotes a view-only claim.
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    /// Refill / follow-up order rather than a new one.
    #[serde(default)]
    pub continuous: bool,
    /// Whether the current provider has opened this claim since it
    /// arrived. Starts `false` only when the claim arrived via transfer.
    #[serde(default = "default_viewed")]
    pub viewed: bool,
    /// Provider who pushed this claim to the current user, if any.
    #[serde(default)]
    pub transferred_by: Option<ProviderId>,
}

fn default_viewed() -> bool {
    true
}

impl Claim {
    /// UI route for this claim, e.g. `/ed/1234/ORD-1` or `/ed-c/1234`.
    ///
    /// Continuous orders get a `-c` suffix on the type segment; the order
    /// id segment is omitted for view-only claims.
    pub fn route(&self) -> String {
        let mut route = format!("/{}", self.claim_type.as_str());
        if self.continuous {
            route.push_str("-c");
        }
        route.push_str(&format!("/{}", self.customer_id));
        if let Some(order_id) = &self.order_id {
            route.push_str(&format!("/{order_id}"));
        }
        route
    }
}

/// Signed-in provider identity, hydrated once at sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: ProviderId,
    pub name: String,
    /// Support-agent id when the session belongs to an agent account.
    #[serde(default)]
    pub agent: Option<i64>,
}

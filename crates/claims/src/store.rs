//! Local claim list, synchronized with the backend.
//!
//! [`ClaimStore`] is the single source of truth for "which customers
//! does the current user have claimed". Locally-initiated mutations
//! (add, remove, transfer) and server pushes received over the
//! realtime channel both funnel through the same private insert/remove
//! helpers, so the list never holds two entries for one customer and
//! removal is idempotent regardless of which side initiated it.
//!
//! The list is held as an `Arc<Vec<Claim>>` snapshot: every mutation
//! builds a new vector and swaps it in, so readers are never handed a
//! half-updated list.

use std::sync::{Arc, Mutex};

use telecare_core::types::{Claim, CustomerId, ProviderId, RemoveReason};
use telecare_events::{EventBus, NoticeLevel, PortalEvent};
use telecare_rest::{codes, require_data, RestError};

use crate::api::ClaimsBackend;
use crate::remote::RemoteClaimEvent;

/// Errors from the claim store.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    /// The backend call failed or reported an error the store does not
    /// special-case.
    #[error(transparent)]
    Rest(#[from] RestError),
}

/// Result of a claim attempt.
///
/// Only `Claimed` changes the local list; the declined variants have
/// already been surfaced to the user as notices.
#[derive(Debug, Clone)]
pub enum AddOutcome {
    /// The backend accepted; the claim is now in the local list.
    Claimed(Claim),
    /// Another provider already holds this customer.
    AlreadyClaimed,
    /// The current user is at their claim limit.
    MaxClaims,
}

/// The current user's claimed customers.
pub struct ClaimStore {
    api: Arc<dyn ClaimsBackend>,
    bus: Arc<EventBus>,
    claims: Mutex<Arc<Vec<Claim>>>,
}

impl ClaimStore {
    pub fn new(api: Arc<dyn ClaimsBackend>, bus: Arc<EventBus>) -> Self {
        Self {
            api,
            bus,
            claims: Mutex::new(Arc::new(Vec::new())),
        }
    }

    /// Snapshot of the current claim list.
    pub fn claims(&self) -> Arc<Vec<Claim>> {
        Arc::clone(&self.claims.lock().expect("claims lock poisoned"))
    }

    /// Whether the given customer is claimed by the current user.
    pub fn contains(&self, customer_id: CustomerId) -> bool {
        self.claims().iter().any(|c| c.customer_id == customer_id)
    }

    /// Claim a queued order.
    ///
    /// Duplicate-claim and max-claims rejections are surfaced as
    /// notices and returned as declined outcomes, not errors; anything
    /// else the backend reports is propagated.
    pub async fn add(
        &self,
        customer_id: CustomerId,
        order_id: Option<String>,
        continuous: bool,
    ) -> Result<AddOutcome, ClaimError> {
        let res = self.api.add(customer_id, order_id, continuous).await?;

        match res.error_code() {
            Some(codes::DUPLICATE_CLAIM) => {
                self.bus.notice(
                    NoticeLevel::Warning,
                    "Patient has already been claimed by another provider.",
                );
                Ok(AddOutcome::AlreadyClaimed)
            }
            Some(codes::MAX_CLAIMS) => {
                self.bus.notice(
                    NoticeLevel::Error,
                    "You've reached the maximum number of claims. \
                     Please resolve or unclaim previous claims.",
                );
                Ok(AddOutcome::MaxClaims)
            }
            _ => {
                let claim = require_data(res).map_err(ClaimError::from)?;
                self.insert_local(claim.clone(), false);
                self.bus.publish(PortalEvent::ClaimAdded {
                    claim: claim.clone(),
                });
                tracing::info!(customer_id, "Claim added");
                Ok(AddOutcome::Claimed(claim))
            }
        }
    }

    /// Replace the local list with the backend's.
    ///
    /// Called once at sign-in, and again defensively when the UI's
    /// route points at a customer the list no longer contains.
    pub async fn hydrate(&self) -> Result<(), ClaimError> {
        let res = self.api.fetch().await?;
        let fetched = require_data(res).map_err(ClaimError::from)?;

        // Defensive dedup: first entry per customer wins.
        let mut list: Vec<Claim> = Vec::with_capacity(fetched.len());
        for claim in fetched {
            if !list.iter().any(|c| c.customer_id == claim.customer_id) {
                list.push(claim);
            }
        }

        tracing::info!(count = list.len(), "Hydrated claim list");
        *self.claims.lock().expect("claims lock poisoned") = Arc::new(list);
        Ok(())
    }

    /// Drop a claim, reporting why.
    pub async fn remove(
        &self,
        customer_id: CustomerId,
        reason: RemoveReason,
    ) -> Result<(), ClaimError> {
        let res = self.api.remove(customer_id, reason).await?;
        require_data(res).map_err(ClaimError::from)?;

        if self.remove_local(customer_id) {
            self.bus.publish(PortalEvent::ClaimRemoved {
                customer_id,
                switch_view: true,
            });
        }
        tracing::info!(customer_id, ?reason, "Claim removed");
        Ok(())
    }

    /// Reassign a claim to another provider or agent.
    ///
    /// Our side of the transfer is synchronous: the claim leaves the
    /// local list as soon as the backend confirms. The receiving
    /// provider learns of their new claim only through the realtime
    /// push, which arrives at their store via [`apply_remote`].
    ///
    /// [`apply_remote`]: ClaimStore::apply_remote
    pub async fn transfer(
        &self,
        customer_id: CustomerId,
        target: ProviderId,
        note: &str,
    ) -> Result<(), ClaimError> {
        let res = self.api.transfer(customer_id, target, note).await?;
        require_data(res).map_err(ClaimError::from)?;

        if self.remove_local(customer_id) {
            self.bus.publish(PortalEvent::ClaimRemoved {
                customer_id,
                switch_view: true,
            });
        }
        tracing::info!(customer_id, target, "Claim transferred");
        Ok(())
    }

    /// Record that the provider opened the claim.
    ///
    /// No-op when the customer is not in the local list.
    pub async fn mark_viewed(&self, customer_id: CustomerId) -> Result<(), ClaimError> {
        let updated = {
            let mut guard = self.claims.lock().expect("claims lock poisoned");
            let mut found = false;
            let list: Vec<Claim> = guard
                .iter()
                .cloned()
                .map(|mut c| {
                    if c.customer_id == customer_id {
                        found = true;
                        c.viewed = true;
                    }
                    c
                })
                .collect();
            if found {
                *guard = Arc::new(list);
            }
            found
        };

        if updated {
            let res = self.api.mark_viewed(customer_id).await?;
            require_data(res).map_err(ClaimError::from)?;
        }
        Ok(())
    }

    /// Apply a server-pushed claim event.
    ///
    /// Pushes may race locally-initiated mutations for the same
    /// customer; both paths share the insert/remove helpers, so a
    /// stale removal is a no-op and a transfer replaces any existing
    /// entry for the customer.
    pub fn apply_remote(&self, event: RemoteClaimEvent) {
        match event {
            RemoteClaimEvent::ClaimTransfered { mut claim } => {
                // Transfers arrive unseen.
                claim.viewed = false;
                let customer_id = claim.customer_id;
                self.insert_local(claim.clone(), true);
                self.bus.publish(PortalEvent::ClaimAdded { claim });
                self.bus
                    .notice(NoticeLevel::Info, "A patient has been transferred to you");
                tracing::info!(customer_id, "Claim received via transfer");
            }
            RemoteClaimEvent::ClaimRemoved { customer_id } => {
                if self.remove_local(customer_id) {
                    self.bus.publish(PortalEvent::ClaimRemoved {
                        customer_id,
                        switch_view: true,
                    });
                    tracing::info!(customer_id, "Claim removed by server push");
                }
            }
        }
    }

    /// Drop every claim. Called on sign-out.
    pub fn clear(&self) {
        *self.claims.lock().expect("claims lock poisoned") = Arc::new(Vec::new());
    }

    // ---- private helpers ----

    /// Insert a claim, replacing any existing entry for the customer.
    fn insert_local(&self, claim: Claim, front: bool) {
        let mut guard = self.claims.lock().expect("claims lock poisoned");
        let mut list: Vec<Claim> = guard
            .iter()
            .filter(|c| c.customer_id != claim.customer_id)
            .cloned()
            .collect();
        if front {
            list.insert(0, claim);
        } else {
            list.push(claim);
        }
        *guard = Arc::new(list);
    }

    /// Remove a claim by customer id. Returns whether it was present.
    fn remove_local(&self, customer_id: CustomerId) -> bool {
        let mut guard = self.claims.lock().expect("claims lock poisoned");
        if !guard.iter().any(|c| c.customer_id == customer_id) {
            return false;
        }
        let list: Vec<Claim> = guard
            .iter()
            .filter(|c| c.customer_id != customer_id)
            .cloned()
            .collect();
        *guard = Arc::new(list);
        true
    }
}

//! Integration tests for the claim store's dedup and idempotence
//! guarantees, run against a scripted mock backend.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio::sync::broadcast::error::TryRecvError;

use telecare_claims::{parse_event, AddOutcome, ClaimStore, ClaimsBackend, RemoteClaimEvent};
use telecare_core::types::{Claim, ClaimType, CustomerId, ProviderId, RemoveReason};
use telecare_events::{EventBus, NoticeLevel, PortalEvent};
use telecare_rest::{codes, ApiError, ApiResponse, RestError};

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

/// Scripted claims backend: `add` either succeeds with a server-style
/// claim record or reports the configured error code.
#[derive(Default)]
struct MockBackend {
    add_error: Mutex<Option<i64>>,
    fetch_claims: Mutex<Vec<Claim>>,
}

impl MockBackend {
    fn reject_add_with(&self, code: i64) {
        *self.add_error.lock().unwrap() = Some(code);
    }

    fn serve_claims(&self, claims: Vec<Claim>) {
        *self.fetch_claims.lock().unwrap() = claims;
    }
}

fn ok<T>(data: T) -> ApiResponse<T> {
    ApiResponse {
        data: Some(data),
        error: None,
        warning: None,
        handled: false,
    }
}

fn backend_error<T>(code: i64) -> ApiResponse<T> {
    ApiResponse {
        data: None,
        error: Some(ApiError {
            code,
            msg: serde_json::json!("mock error"),
        }),
        warning: None,
        handled: false,
    }
}

fn claim(customer_id: CustomerId, order_id: Option<String>, continuous: bool) -> Claim {
    Claim {
        customer_id,
        order_id,
        claim_type: ClaimType::Ed,
        continuous,
        viewed: true,
        transferred_by: None,
    }
}

#[async_trait]
impl ClaimsBackend for MockBackend {
    async fn add(
        &self,
        customer_id: CustomerId,
        order_id: Option<String>,
        continuous: bool,
    ) -> Result<ApiResponse<Claim>, RestError> {
        if let Some(code) = *self.add_error.lock().unwrap() {
            return Ok(backend_error(code));
        }
        Ok(ok(claim(customer_id, order_id, continuous)))
    }

    async fn fetch(&self) -> Result<ApiResponse<Vec<Claim>>, RestError> {
        Ok(ok(self.fetch_claims.lock().unwrap().clone()))
    }

    async fn remove(
        &self,
        _customer_id: CustomerId,
        _reason: RemoveReason,
    ) -> Result<ApiResponse<serde_json::Value>, RestError> {
        Ok(ok(serde_json::json!(true)))
    }

    async fn transfer(
        &self,
        _customer_id: CustomerId,
        _target: ProviderId,
        _note: &str,
    ) -> Result<ApiResponse<serde_json::Value>, RestError> {
        Ok(ok(serde_json::json!(true)))
    }

    async fn mark_viewed(
        &self,
        _customer_id: CustomerId,
    ) -> Result<ApiResponse<serde_json::Value>, RestError> {
        Ok(ok(serde_json::json!(true)))
    }
}

fn store() -> (ClaimStore, Arc<MockBackend>, Arc<EventBus>) {
    let backend = Arc::new(MockBackend::default());
    let bus = Arc::new(EventBus::default());
    let store = ClaimStore::new(
        Arc::clone(&backend) as Arc<dyn ClaimsBackend>,
        Arc::clone(&bus),
    );
    (store, backend, bus)
}

// ---------------------------------------------------------------------------
// Add / dedup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_inserts_and_publishes() {
    let (store, _backend, bus) = store();
    let mut rx = bus.subscribe();

    let outcome = store.add(500, Some("ORD-1".into()), false).await.unwrap();

    assert_matches!(outcome, AddOutcome::Claimed(c) if c.customer_id == 500);
    assert!(store.contains(500));
    assert_matches!(
        rx.try_recv(),
        Ok(PortalEvent::ClaimAdded { claim }) if claim.customer_id == 500
    );
}

/// The local list never holds two entries for one customer, whatever
/// sequence of adds and pushes produced it.
#[tokio::test]
async fn claim_list_never_duplicates_a_customer() {
    let (store, _backend, _bus) = store();

    store.add(500, Some("ORD-1".into()), false).await.unwrap();
    store.add(500, Some("ORD-2".into()), false).await.unwrap();
    store.apply_remote(RemoteClaimEvent::ClaimTransfered {
        claim: claim(500, Some("ORD-3".into()), false),
    });

    let claims = store.claims();
    assert_eq!(claims.len(), 1);
    // Last write wins.
    assert_eq!(claims[0].order_id.as_deref(), Some("ORD-3"));
}

/// Two providers race for the same customer; the loser gets a warning
/// notice and an unchanged list, not an error.
#[tokio::test]
async fn duplicate_claim_is_a_warning_not_an_error() {
    let (store, backend, bus) = store();
    backend.reject_add_with(codes::DUPLICATE_CLAIM);
    let mut rx = bus.subscribe();

    let outcome = store.add(500, Some("ORD-1".into()), false).await.unwrap();

    assert_matches!(outcome, AddOutcome::AlreadyClaimed);
    assert!(!store.contains(500));
    assert_matches!(
        rx.try_recv(),
        Ok(PortalEvent::Notice { level: NoticeLevel::Warning, .. })
    );
    assert_matches!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn max_claims_is_an_error_notice() {
    let (store, backend, bus) = store();
    backend.reject_add_with(codes::MAX_CLAIMS);
    let mut rx = bus.subscribe();

    let outcome = store.add(500, Some("ORD-1".into()), false).await.unwrap();

    assert_matches!(outcome, AddOutcome::MaxClaims);
    assert!(!store.contains(500));
    assert_matches!(
        rx.try_recv(),
        Ok(PortalEvent::Notice { level: NoticeLevel::Error, .. })
    );
}

#[tokio::test]
async fn other_backend_errors_propagate() {
    let (store, backend, _bus) = store();
    backend.reject_add_with(9999);

    let result = store.add(500, Some("ORD-1".into()), false).await;

    assert!(result.is_err());
    assert!(!store.contains(500));
}

// ---------------------------------------------------------------------------
// Remote pushes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transfer_push_arrives_unviewed_at_the_front() {
    let (store, _backend, bus) = store();
    store.add(400, Some("ORD-0".into()), false).await.unwrap();
    let mut rx = bus.subscribe();

    store.apply_remote(RemoteClaimEvent::ClaimTransfered {
        claim: claim(500, Some("ORD-1".into()), false),
    });

    let claims = store.claims();
    assert_eq!(claims.len(), 2);
    assert_eq!(claims[0].customer_id, 500);
    assert!(!claims[0].viewed);

    assert_matches!(
        rx.try_recv(),
        Ok(PortalEvent::ClaimAdded { claim }) if claim.customer_id == 500
    );
    assert_matches!(
        rx.try_recv(),
        Ok(PortalEvent::Notice { level: NoticeLevel::Info, .. })
    );
}

/// Processing the same removal twice (local success plus a stale push)
/// leaves the list as if it were processed once, and the second pass
/// publishes nothing.
#[tokio::test]
async fn claim_removal_is_idempotent() {
    let (store, _backend, bus) = store();
    store.add(500, Some("ORD-1".into()), false).await.unwrap();
    let mut rx = bus.subscribe();

    store.apply_remote(RemoteClaimEvent::ClaimRemoved { customer_id: 500 });
    assert!(!store.contains(500));
    assert_matches!(
        rx.try_recv(),
        Ok(PortalEvent::ClaimRemoved { customer_id: 500, switch_view: true })
    );

    store.apply_remote(RemoteClaimEvent::ClaimRemoved { customer_id: 500 });
    assert!(!store.contains(500));
    assert_matches!(rx.try_recv(), Err(TryRecvError::Empty));
}

// ---------------------------------------------------------------------------
// Transfer round trip
// ---------------------------------------------------------------------------

/// Provider A transfers customer 500 to provider B: A's list loses the
/// entry synchronously and fires a navigate-away removal; B's list
/// gains exactly one entry when the push lands.
#[tokio::test]
async fn transfer_round_trip() {
    // Provider A.
    let (store_a, _backend_a, bus_a) = store();
    store_a.add(500, Some("ORD-1".into()), false).await.unwrap();
    let mut rx_a = bus_a.subscribe();

    store_a.transfer(500, 42, "please review").await.unwrap();

    assert!(!store_a.contains(500));
    assert_matches!(
        rx_a.try_recv(),
        Ok(PortalEvent::ClaimRemoved { customer_id: 500, switch_view: true })
    );

    // Provider B receives the push over the realtime channel.
    let (store_b, _backend_b, _bus_b) = store();
    let push = serde_json::json!({
        "type": "claim_transfered",
        "claim": {
            "customerId": 500,
            "orderId": "ORD-1",
            "type": "ed",
            "continuous": false,
            "transferredBy": 7
        }
    });
    store_b.apply_remote(parse_event(push).unwrap());

    let claims = store_b.claims();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].customer_id, 500);
    assert_eq!(claims[0].transferred_by, Some(7));
}

// ---------------------------------------------------------------------------
// Hydrate / remove / viewed / clear
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hydrate_replaces_and_dedups() {
    let (store, backend, _bus) = store();
    store.add(999, None, false).await.unwrap();

    backend.serve_claims(vec![
        claim(500, Some("ORD-1".into()), false),
        claim(501, Some("ORD-2".into()), true),
        claim(500, Some("ORD-9".into()), false),
    ]);
    store.hydrate().await.unwrap();

    let claims = store.claims();
    assert_eq!(claims.len(), 2);
    assert!(!store.contains(999));
    assert_eq!(claims[0].order_id.as_deref(), Some("ORD-1"));
}

#[tokio::test]
async fn remove_publishes_navigate_away() {
    let (store, _backend, bus) = store();
    store.add(500, Some("ORD-1".into()), false).await.unwrap();
    let mut rx = bus.subscribe();

    store.remove(500, RemoveReason::Approved).await.unwrap();

    assert!(!store.contains(500));
    assert_matches!(
        rx.try_recv(),
        Ok(PortalEvent::ClaimRemoved { customer_id: 500, switch_view: true })
    );
}

#[tokio::test]
async fn mark_viewed_flips_the_flag() {
    let (store, _backend, _bus) = store();
    store.apply_remote(RemoteClaimEvent::ClaimTransfered {
        claim: claim(500, Some("ORD-1".into()), false),
    });
    assert!(!store.claims()[0].viewed);

    store.mark_viewed(500).await.unwrap();
    assert!(store.claims()[0].viewed);

    // Unknown customer is a no-op.
    store.mark_viewed(999).await.unwrap();
}

#[tokio::test]
async fn clear_empties_the_list() {
    let (store, _backend, _bus) = store();
    store.add(500, Some("ORD-1".into()), false).await.unwrap();
    store.add(501, Some("ORD-2".into()), false).await.unwrap();

    store.clear();

    assert!(store.claims().is_empty());
}

//! Claims REST endpoints.
//!
//! [`ClaimsBackend`] is the seam the claim store talks through;
//! [`ClaimsApi`] is its production implementation over
//! [`BackendClient`]. The trait exists so store behaviour (dedup,
//! duplicate-claim handling, event publication) is testable without a
//! live backend.

use async_trait::async_trait;
use serde::Serialize;
use telecare_core::types::{Claim, CustomerId, ProviderId, RemoveReason};
use telecare_rest::{ApiResponse, BackendClient, RequestOptions, RestError};

/// Request body for `POST monolith/order/claim`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    customer_id: CustomerId,
    order_id: Option<String>,
    continuous: bool,
}

/// Request body for `DELETE monolith/order/claim`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveBody {
    customer_id: CustomerId,
    reason: RemoveReason,
}

/// Request body for `PUT monolith/order/claim/transfer`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferBody {
    customer_id: CustomerId,
    agent: ProviderId,
    note: String,
}

/// Request body for `PUT monolith/order/claim/view`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewBody {
    customer_id: CustomerId,
}

/// Backend operations the claim store depends on.
///
/// Envelopes are returned unconsumed because the store reacts to
/// specific error codes (duplicate claim, max claims) differently from
/// generic failures.
#[async_trait]
pub trait ClaimsBackend: Send + Sync {
    /// Claim a queued order for the current user.
    async fn add(
        &self,
        customer_id: CustomerId,
        order_id: Option<String>,
        continuous: bool,
    ) -> Result<ApiResponse<Claim>, RestError>;

    /// Fetch every claim currently held by the signed-in user.
    async fn fetch(&self) -> Result<ApiResponse<Vec<Claim>>, RestError>;

    /// Drop a claim, reporting why.
    async fn remove(
        &self,
        customer_id: CustomerId,
        reason: RemoveReason,
    ) -> Result<ApiResponse<serde_json::Value>, RestError>;

    /// Reassign a claim to another provider or agent.
    async fn transfer(
        &self,
        customer_id: CustomerId,
        target: ProviderId,
        note: &str,
    ) -> Result<ApiResponse<serde_json::Value>, RestError>;

    /// Record that the current provider opened the claim.
    async fn mark_viewed(
        &self,
        customer_id: CustomerId,
    ) -> Result<ApiResponse<serde_json::Value>, RestError>;
}

/// Production claims endpoints on the monolith service.
pub struct ClaimsApi {
    client: BackendClient,
}

impl ClaimsApi {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClaimsBackend for ClaimsApi {
    async fn add(
        &self,
        customer_id: CustomerId,
        order_id: Option<String>,
        continuous: bool,
    ) -> Result<ApiResponse<Claim>, RestError> {
        let body = AddBody {
            customer_id,
            order_id,
            continuous,
        };
        self.client
            .post("monolith", "order/claim", &body, RequestOptions::default())
            .await
    }

    async fn fetch(&self) -> Result<ApiResponse<Vec<Claim>>, RestError> {
        self.client
            .get("monolith", "order/claimed", RequestOptions::default())
            .await
    }

    async fn remove(
        &self,
        customer_id: CustomerId,
        reason: RemoveReason,
    ) -> Result<ApiResponse<serde_json::Value>, RestError> {
        let body = RemoveBody {
            customer_id,
            reason,
        };
        self.client
            .delete("monolith", "order/claim", &body, RequestOptions::default())
            .await
    }

    async fn transfer(
        &self,
        customer_id: CustomerId,
        target: ProviderId,
        note: &str,
    ) -> Result<ApiResponse<serde_json::Value>, RestError> {
        let body = TransferBody {
            customer_id,
            agent: target,
            note: note.to_string(),
        };
        self.client
            .put(
                "monolith",
                "order/claim/transfer",
                &body,
                RequestOptions::default(),
            )
            .await
    }

    async fn mark_viewed(
        &self,
        customer_id: CustomerId,
    ) -> Result<ApiResponse<serde_json::Value>, RestError> {
        let body = ViewBody { customer_id };
        self.client
            .put(
                "monolith",
                "order/claim/view",
                &body,
                RequestOptions::default(),
            )
            .await
    }
}

//! Fire-and-forget mirroring of session requests to the backend's
//! request journal.
//!
//! Every user-initiated session request is reported to
//! `providers/request` for support debugging. Journal posts are
//! background calls so they neither reset the inactivity timer nor
//! journal themselves.

use chrono::Utc;
use serde::Serialize;

use crate::client::{BackendClient, RequestOptions};
use crate::envelope::ApiResponse;

/// One journal row, matching the `providers/request` endpoint.
///
/// `data` and `opts` are pre-stringified so the journal stores them
/// verbatim regardless of shape.
#[derive(Debug, Serialize)]
struct JournalEntry {
    method: String,
    url: String,
    data: String,
    opts: String,
    at: String,
}

/// Spawn a background task posting the request to the journal.
///
/// Failures are logged and dropped; the journal must never affect the
/// request it describes.
pub(crate) fn record(
    client: &BackendClient,
    method: &str,
    url: &str,
    data: Option<&serde_json::Value>,
    opts: &RequestOptions,
) {
    let entry = JournalEntry {
        method: method.to_string(),
        url: url.to_string(),
        data: data.map(|d| d.to_string()).unwrap_or_default(),
        opts: serde_json::to_string(opts).expect("RequestOptions is always serialisable"),
        at: Utc::now().to_rfc3339(),
    };

    let client = client.clone();
    tokio::spawn(async move {
        let result: Result<ApiResponse<serde_json::Value>, _> = client
            .post("providers", "request", &entry, RequestOptions::background())
            .await;
        match result {
            Ok(res) => {
                if let Some(error) = res.error {
                    tracing::warn!(code = error.code, "Request journal rejected entry");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Request journal unreachable");
            }
        }
    });
}

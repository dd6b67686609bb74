//! Backend response envelope and error codes.
//!
//! Every backend endpoint responds with the same JSON envelope:
//! `{"data": ..., "error": {"code": ..., "msg": ...}, "warning": ...}`.
//! All three fields are optional; a response may carry data and a
//! warning at the same time.

use serde::Deserialize;

/// Backend error codes the portal reacts to specially.
///
/// Codes not listed here are surfaced verbatim to the caller.
pub mod codes {
    /// The session token is missing or expired.
    pub const NO_SESSION: i64 = 102;
    /// An upstream service the backend called on our behalf failed.
    pub const UPSTREAM_FAILED: i64 = 207;
    /// The signed-in user lacks the rights for the requested action.
    pub const INSUFFICIENT_RIGHTS: i64 = 1000;
    /// One or more request fields failed validation; `msg` is a field
    /// tree rather than a plain string.
    pub const INVALID_FIELD: i64 = 1001;
    /// The customer is already claimed by another provider.
    pub const DUPLICATE_CLAIM: i64 = 1101;
    /// The provider has reached the maximum number of open claims.
    pub const MAX_CLAIMS: i64 = 1505;
}

/// A backend-reported error.
///
/// `msg` is kept as a raw JSON value because validation errors
/// ([`codes::INVALID_FIELD`]) report a field tree instead of a string.
#[derive(Debug, Clone, Deserialize, thiserror::Error)]
#[error("Backend error {code}: {msg}")]
pub struct ApiError {
    pub code: i64,
    #[serde(default)]
    pub msg: serde_json::Value,
}

/// The backend's standard response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default = "none")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiError>,
    /// Free-form warning payload, surfaced to the user as a
    /// non-blocking notification.
    #[serde(default)]
    pub warning: Option<serde_json::Value>,
    /// Set by the client when a shared error handler already reacted
    /// to `error` (signed-out, rights, upstream failure). Callers must
    /// not re-surface handled errors.
    #[serde(skip)]
    pub handled: bool,
}

// `#[serde(default)]` alone would require `T: Default`.
fn none<T>() -> Option<T> {
    None
}

impl<T> ApiResponse<T> {
    /// Consume the envelope, treating any unhandled error as `Err`.
    ///
    /// A handled error (or no error) yields whatever data is present.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        match self.error {
            Some(error) if !self.handled => Err(error),
            _ => Ok(self.data),
        }
    }

    /// The error code, if any error is present.
    pub fn error_code(&self) -> Option<i64> {
        self.error.as_ref().map(|e| e.code)
    }
}

//! HTTP client for the Telecare backend.
//!
//! [`BackendClient`] wraps [`reqwest`] with the portal's cross-cutting
//! request behaviour:
//!
//! - every user-initiated (non-background) request invokes the
//!   registered activity hook before dispatch, so the inactivity
//!   monitor sees the user as active;
//! - session requests are mirrored to the backend's request journal as
//!   fire-and-forget background calls;
//! - HTTP 401 and the no-session backend code are session-fatal: both
//!   publish [`PortalEvent::SignedOut`] so every service clears its
//!   local state;
//! - envelope warnings and the shared error codes are converted into
//!   user-facing notices.

use std::sync::{Arc, Mutex};

use reqwest::Method;
use serde::Serialize;
use telecare_events::{EventBus, NoticeLevel, PortalEvent};

use crate::envelope::{codes, ApiError, ApiResponse};
use crate::journal;

/// Callback invoked before every user-initiated request is sent.
///
/// Wired to `ActivityMonitor::reset` at application start.
pub type ActivityHook = Arc<dyn Fn() + Send + Sync>;

/// Per-request behaviour flags.
///
/// The defaults describe a normal user-initiated call: it resets the
/// inactivity timer and is mirrored to the request journal.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequestOptions {
    /// Background requests (polling, keep-alive handshakes) skip the
    /// activity hook so they never defer the inactivity sign-out.
    pub background: bool,
    /// Session requests are mirrored to the backend request journal.
    pub session: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            background: false,
            session: true,
        }
    }
}

impl RequestOptions {
    /// Options for a background call: no activity reset, no journal.
    pub fn background() -> Self {
        Self {
            background: true,
            session: false,
        }
    }
}

/// Errors from the backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The backend rejected the session (HTTP 401).
    #[error("Session expired or invalid")]
    SessionExpired,

    /// Encoding the request or decoding the envelope failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope carried an error no shared handler reacted to.
    #[error(transparent)]
    Backend(#[from] ApiError),

    /// The envelope carried neither data nor an error.
    #[error("Backend response contained no data")]
    MissingData,
}

/// Shared HTTP client for all backend services.
///
/// Cheap to clone; all clones share the same connection pool, session
/// token, and activity hook.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<Mutex<Option<String>>>,
    activity: Arc<Mutex<Option<ActivityHook>>>,
    bus: Arc<EventBus>,
}

impl BackendClient {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, bus)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        bus: Arc<EventBus>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            session: Arc::new(Mutex::new(None)),
            activity: Arc::new(Mutex::new(None)),
            bus,
        }
    }

    /// The current session token, if signed in.
    pub fn session(&self) -> Option<String> {
        self.session.lock().expect("session lock poisoned").clone()
    }

    /// Replace the session token (`None` on sign-out).
    pub fn set_session(&self, token: Option<String>) {
        *self.session.lock().expect("session lock poisoned") = token;
    }

    /// Register the hook invoked before every non-background request.
    pub fn set_activity_hook(&self, hook: ActivityHook) {
        *self.activity.lock().expect("activity lock poisoned") = Some(hook);
    }

    /// Event bus this client publishes notices and sign-outs on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// `GET {base}/{service}/{noun}`.
    pub async fn get<T: serde::de::DeserializeOwned>(
        &self,
        service: &str,
        noun: &str,
        opts: RequestOptions,
    ) -> Result<ApiResponse<T>, RestError> {
        self.request(Method::GET, service, noun, None, opts).await
    }

    /// `POST {base}/{service}/{noun}` with a JSON body.
    pub async fn post<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        service: &str,
        noun: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<ApiResponse<T>, RestError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, service, noun, Some(body), opts)
            .await
    }

    /// `PUT {base}/{service}/{noun}` with a JSON body.
    pub async fn put<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        service: &str,
        noun: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<ApiResponse<T>, RestError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, service, noun, Some(body), opts)
            .await
    }

    /// `DELETE {base}/{service}/{noun}` with a JSON body.
    pub async fn delete<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        service: &str,
        noun: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<ApiResponse<T>, RestError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::DELETE, service, noun, Some(body), opts)
            .await
    }

    // ---- private helpers ----

    fn url(&self, service: &str, noun: &str) -> String {
        format!("{}/{}/{}", self.base_url, service, noun)
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        service: &str,
        noun: &str,
        body: Option<serde_json::Value>,
        opts: RequestOptions,
    ) -> Result<ApiResponse<T>, RestError> {
        let url = self.url(service, noun);

        // User-initiated activity defers the inactivity sign-out.
        if !opts.background {
            let hook = self
                .activity
                .lock()
                .expect("activity lock poisoned")
                .clone();
            if let Some(hook) = hook {
                hook();
            }
        }

        // Mirror session requests to the journal, except the journal
        // endpoint itself.
        if opts.session && !(service == "providers" && noun == "request") {
            journal::record(self, method.as_str(), &url, body.as_ref(), &opts);
        }

        let mut request = self.http.request(method, &url);
        if let Some(token) = self.session() {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            self.bus.notice(
                NoticeLevel::Error,
                format!("Unable to connect to {}: {e}", self.base_url),
            );
            e
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.bus
                .notice(NoticeLevel::Error, "You have been signed out!");
            self.bus.publish(PortalEvent::SignedOut);
            return Err(RestError::SessionExpired);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            self.bus.notice(
                NoticeLevel::Error,
                format!("Unable to connect to {} ({})", self.base_url, status),
            );
            return Err(RestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: ApiResponse<T> = response.json().await?;
        self.apply_response_hooks(&mut parsed);
        Ok(parsed)
    }

    /// The shared reactions to envelope warnings and error codes,
    /// applied to every successfully-parsed response.
    fn apply_response_hooks<T>(&self, res: &mut ApiResponse<T>) {
        if let Some(warning) = &res.warning {
            self.bus.notice(NoticeLevel::Warning, warning.to_string());
        }

        let Some(error) = &res.error else {
            return;
        };
        match error.code {
            codes::NO_SESSION => {
                self.bus.publish(PortalEvent::SignedOut);
                res.handled = true;
            }
            codes::UPSTREAM_FAILED => {
                self.bus.notice(
                    NoticeLevel::Error,
                    format!("Request to {} failed. Please contact support", error.msg),
                );
                res.handled = true;
            }
            codes::INSUFFICIENT_RIGHTS => {
                self.bus.notice(
                    NoticeLevel::Error,
                    "You lack the necessary rights to do the requested action",
                );
                res.handled = true;
            }
            _ => {}
        }
    }
}

/// Unwrap an envelope into its data, converting unhandled errors and
/// missing payloads into [`RestError`]s.
pub fn require_data<T>(res: ApiResponse<T>) -> Result<T, RestError> {
    match res.into_result() {
        Ok(Some(data)) => Ok(data),
        Ok(None) => Err(RestError::MissingData),
        Err(error) => Err(RestError::Backend(error)),
    }
}

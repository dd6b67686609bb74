//! Typed session endpoints.
//!
//! Sign-in hydration (`providers/session` + `monolith/user`), sign-out
//! with optional idle-time reporting, and the one-time handshake token
//! for the realtime channel.

use serde::Deserialize;
use telecare_core::types::UserProfile;

use crate::client::{require_data, BackendClient, RequestOptions, RestError};

/// Payload of `GET providers/session`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub user: SessionUser,
}

/// The session's account record. Only the agent id is consumed; a
/// `None` agent means a provider account.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub agent: Option<i64>,
}

impl BackendClient {
    /// Validate the current session and return its account record.
    pub async fn session_info(&self) -> Result<SessionInfo, RestError> {
        let res = self
            .get("providers", "session", RequestOptions::default())
            .await?;
        require_data(res)
    }

    /// Fetch the signed-in user's profile.
    pub async fn user(&self) -> Result<UserProfile, RestError> {
        let res = self
            .get("monolith", "user", RequestOptions::default())
            .await?;
        require_data(res)
    }

    /// End the session.
    ///
    /// `idle_secs` is reported when the sign-out was forced by the
    /// inactivity monitor, so the backend can distinguish timeouts
    /// from deliberate sign-outs.
    pub async fn sign_out(&self, idle_secs: Option<u64>) -> Result<(), RestError> {
        let body = match idle_secs {
            Some(secs) => serde_json::json!({ "timeout": secs }),
            None => serde_json::json!({}),
        };
        let res: crate::envelope::ApiResponse<serde_json::Value> = self
            .post("providers", "signout", &body, RequestOptions::default())
            .await?;
        require_data(res)?;
        Ok(())
    }

    /// Obtain a one-time token for the realtime WebSocket handshake.
    ///
    /// This is a background call: reconnect attempts must not defer
    /// the inactivity sign-out.
    pub async fn realtime_token(&self) -> Result<String, RestError> {
        let res = self
            .get("webpoll", "websocket", RequestOptions::background())
            .await?;
        require_data(res)
    }
}

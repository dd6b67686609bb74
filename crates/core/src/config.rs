//! Portal configuration loaded from environment variables.

use std::path::PathBuf;

/// Runtime configuration for the portal core.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Backend REST base URL (default: `http://localhost:3000`).
    pub backend_url: String,
    /// Realtime WebSocket endpoint (default: `ws://localhost:3000/ws`).
    pub ws_url: String,
    /// Minutes of inactivity before the sign-out warning sequence
    /// begins (default: `15`).
    pub inactivity_minutes: u32,
    /// File the unread-notes map is persisted to
    /// (default: `telecare-notes.json`).
    pub notes_path: PathBuf,
    /// Session token for the signed-in provider, if present.
    pub session_token: Option<String>,
}

impl PortalConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                   |
    /// |----------------------|---------------------------|
    /// | `BACKEND_URL`        | `http://localhost:3000`   |
    /// | `WS_URL`             | `ws://localhost:3000/ws`  |
    /// | `INACTIVITY_MINUTES` | `15`                      |
    /// | `NOTES_PATH`         | `telecare-notes.json`     |
    /// | `SESSION_TOKEN`      | --                        |
    pub fn from_env() -> Self {
        let backend_url =
            std::env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:3000".into());

        let ws_url = std::env::var("WS_URL").unwrap_or_else(|_| "ws://localhost:3000/ws".into());

        let inactivity_minutes: u32 = std::env::var("INACTIVITY_MINUTES")
            .unwrap_or_else(|_| "15".into())
            .parse()
            .expect("INACTIVITY_MINUTES must be a valid u32");

        let notes_path: PathBuf = std::env::var("NOTES_PATH")
            .unwrap_or_else(|_| "telecare-notes.json".into())
            .into();

        let session_token = std::env::var("SESSION_TOKEN").ok();

        Self {
            backend_url,
            ws_url,
            inactivity_minutes,
            notes_path,
            session_token,
        }
    }
}

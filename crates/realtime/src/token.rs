//! Handshake token source.
//!
//! The realtime backend authenticates each connection with a one-time
//! token obtained out of band. The trait keeps this crate decoupled
//! from the REST client; the application adapts its backend client to
//! it at wiring time.

use async_trait::async_trait;

use crate::RealtimeError;

/// Provides a fresh one-time token for each connection attempt.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn connection_token(&self) -> Result<String, RealtimeError>;
}

/// Fixed-token source for tests and local development.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn connection_token(&self) -> Result<String, RealtimeError> {
        Ok(self.token.clone())
    }
}

//! Fixed-interval reconnect policy.
//!
//! An unexpected close while subscriptions remain is transient: the
//! channel waits a fixed interval and reconnects, indefinitely. The
//! interval is a policy object rather than an inline constant so tests
//! can shrink it and drive the loop with a virtual clock.

use std::time::Duration;

/// Delay between reconnect attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Reconnect policy: fixed delay, unbounded attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Sleep out one backoff interval.
    pub async fn wait(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

//! Inactivity monitor.
//!
//! Two-stage countdown driving the forced sign-out sequence: after
//! `(minutes - 1)` minutes without qualifying activity the `warning`
//! callback fires (the UI shows the stay-signed-in interstitial), and
//! 60 seconds later the `signout` callback fires. Any qualifying
//! activity calls [`reset`](ActivityMonitor::reset), which collapses
//! whichever stage is pending back to a fresh first-stage countdown.
//!
//! Both stages live in one spawned task, so at most one countdown
//! exists at a time. All sleeps use `tokio::time`, which lets tests
//! drive the state machine under a paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::SessionError;

/// Grace period between the warning and the forced sign-out.
const WARNING_GRACE: Duration = Duration::from_secs(60);

/// Invoked when the warning stage fires.
pub type WarningCallback = Arc<dyn Fn() + Send + Sync>;

/// Invoked when the sign-out stage fires, with the configured idle
/// threshold in minutes.
pub type SignoutCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// The two transition callbacks.
#[derive(Clone)]
pub struct Callbacks {
    pub warning: WarningCallback,
    pub signout: SignoutCallback,
}

struct MonitorConfig {
    minutes: u32,
    callbacks: Callbacks,
}

struct Shared {
    config: Mutex<Option<Arc<MonitorConfig>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Watches for user inactivity and drives the warning-then-sign-out
/// sequence.
pub struct ActivityMonitor {
    shared: Arc<Shared>,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                config: Mutex::new(None),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Configure the idle threshold and transition callbacks.
    ///
    /// Must be called before any other operation. Re-initialising
    /// replaces the configuration without restarting a countdown
    /// already in flight; the running countdown picks up the new
    /// callbacks at its next transition.
    pub fn init(&self, minutes: u32, callbacks: Callbacks) -> Result<(), SessionError> {
        if minutes < 1 {
            return Err(SessionError::Config(
                "inactivity minutes must be at least 1".into(),
            ));
        }
        *self.shared.config.lock().expect("config lock poisoned") =
            Some(Arc::new(MonitorConfig { minutes, callbacks }));
        Ok(())
    }

    /// Begin the first-stage countdown.
    ///
    /// A no-op (beyond a log line) if a countdown is already running.
    pub fn start(&self) {
        let mut timer = self.shared.timer.lock().expect("timer lock poisoned");
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::warn!("Inactivity timer already started");
            return;
        }
        *timer = self.spawn_countdown();
    }

    /// Qualifying activity: cancel whichever stage is pending and
    /// restart the first stage.
    ///
    /// With `force`, a countdown is started even when none was
    /// running, guaranteeing a timer exists after the call.
    pub fn reset(&self, force: bool) {
        let mut timer = self.shared.timer.lock().expect("timer lock poisoned");
        let was_running = timer.as_ref().is_some_and(|h| !h.is_finished());
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        if was_running || force {
            *timer = self.spawn_countdown();
        }
    }

    /// Cancel both stages. Called on sign-out.
    pub fn stop(&self) {
        let mut timer = self.shared.timer.lock().expect("timer lock poisoned");
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }

    fn spawn_countdown(&self) -> Option<JoinHandle<()>> {
        let config = self
            .shared
            .config
            .lock()
            .expect("config lock poisoned")
            .clone();
        let Some(config) = config else {
            tracing::warn!("Inactivity monitor used before init");
            return None;
        };

        let first_stage = Duration::from_secs(u64::from(config.minutes - 1) * 60);
        let shared = Arc::clone(&self.shared);
        Some(tokio::spawn(async move {
            tokio::time::sleep(first_stage).await;

            // Callbacks are read at fire time so a re-init takes
            // effect without restarting the countdown.
            let Some(config) = current_config(&shared) else {
                return;
            };
            tracing::info!(minutes = config.minutes, "Inactivity warning");
            (config.callbacks.warning)();

            tokio::time::sleep(WARNING_GRACE).await;

            let Some(config) = current_config(&shared) else {
                return;
            };
            tracing::info!(minutes = config.minutes, "Inactivity sign-out");
            (config.callbacks.signout)(config.minutes);
        }))
    }
}

fn current_config(shared: &Shared) -> Option<Arc<MonitorConfig>> {
    shared.config.lock().expect("config lock poisoned").clone()
}

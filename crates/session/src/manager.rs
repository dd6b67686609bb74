//! Session lifecycle orchestration.
//!
//! [`SessionManager`] wraps the session endpoints and publishes the
//! sign-in/sign-out events the other services react to. It also wires
//! the inactivity monitor's transitions: the warning publishes
//! [`PortalEvent::SignOutWarning`], and the final stage signs the
//! session out with the elapsed idle time reported to the backend.

use std::sync::Arc;

use telecare_core::types::UserProfile;
use telecare_events::{EventBus, PortalEvent};
use telecare_rest::BackendClient;

use crate::monitor::{Callbacks, SignoutCallback, WarningCallback};
use crate::SessionError;

/// Sign-in/sign-out orchestration for one provider session.
pub struct SessionManager {
    client: BackendClient,
    bus: Arc<EventBus>,
}

impl SessionManager {
    pub fn new(client: BackendClient, bus: Arc<EventBus>) -> Self {
        Self { client, bus }
    }

    /// Validate the session and hydrate the signed-in user.
    ///
    /// The session endpoint supplies the agent id, the user endpoint
    /// the rest of the profile. A failed validation clears the stored
    /// session token so the next attempt starts clean.
    pub async fn sign_in(&self) -> Result<UserProfile, SessionError> {
        let session = match self.client.session_info().await {
            Ok(session) => session,
            Err(e) => {
                self.client.set_session(None);
                return Err(e.into());
            }
        };

        let mut user = self.client.user().await?;
        user.agent = session.user.agent;

        tracing::info!(user_id = user.id, "Signed in");
        self.bus
            .publish(PortalEvent::SignedIn { user: user.clone() });
        Ok(user)
    }

    /// Deliberate sign-out.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.client.sign_out(None).await?;
        self.end_session();
        Ok(())
    }

    /// Inactivity-forced sign-out, reporting the idle time.
    pub async fn timeout(&self, minutes: u32) -> Result<(), SessionError> {
        self.client.sign_out(Some(u64::from(minutes) * 60)).await?;
        tracing::info!(minutes, "Signed out after inactivity");
        self.end_session();
        Ok(())
    }

    /// Monitor callbacks wired to this manager.
    ///
    /// The warning publishes [`PortalEvent::SignOutWarning`]; the
    /// sign-out stage runs [`timeout`](SessionManager::timeout) in a
    /// spawned task, since monitor callbacks are synchronous.
    pub fn monitor_callbacks(self: &Arc<Self>) -> Callbacks {
        let bus = Arc::clone(&self.bus);
        let warning: WarningCallback = Arc::new(move || {
            bus.publish(PortalEvent::SignOutWarning);
        });

        let manager = Arc::clone(self);
        let signout: SignoutCallback = Arc::new(move |minutes| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                if let Err(e) = manager.timeout(minutes).await {
                    tracing::error!(error = %e, "Inactivity sign-out failed");
                }
            });
        });

        Callbacks { warning, signout }
    }

    fn end_session(&self) {
        self.client.set_session(None);
        self.bus.publish(PortalEvent::SignedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn warning_callback_publishes_the_event() {
        let bus = Arc::new(EventBus::default());
        let client = BackendClient::new("http://localhost:3000", Arc::clone(&bus));
        let manager = Arc::new(SessionManager::new(client, Arc::clone(&bus)));

        let callbacks = manager.monitor_callbacks();
        let mut rx = bus.subscribe();

        (callbacks.warning)();

        assert_matches!(rx.try_recv(), Ok(PortalEvent::SignOutWarning));
    }
}

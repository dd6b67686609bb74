//! `telecare-console` -- headless provider-session runner.
//!
//! Signs in with the configured session token, hydrates the claim
//! list, subscribes to the provider's realtime key, starts the
//! inactivity monitor, and then logs portal events until the session
//! ends. Ctrl-C triggers a clean sign-out.
//!
//! # Environment variables
//!
//! | Variable             | Required | Default                  | Description                     |
//! |----------------------|----------|--------------------------|---------------------------------|
//! | `SESSION_TOKEN`      | yes      | --                       | Provider session token          |
//! | `BACKEND_URL`        | no       | `http://localhost:3000`  | Backend REST base URL           |
//! | `WS_URL`             | no       | `ws://localhost:3000/ws` | Realtime WebSocket endpoint     |
//! | `INACTIVITY_MINUTES` | no       | `15`                     | Idle minutes before sign-out    |
//! | `NOTES_PATH`         | no       | `telecare-notes.json`    | Unread-notes persistence file   |

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telecare_claims::{parse_event, ClaimStore, ClaimsApi, UnreadNotes};
use telecare_core::PortalConfig;
use telecare_events::{EventBus, NoticeLevel, PortalEvent};
use telecare_realtime::{Callback, ChannelConfig, RealtimeChannel, RealtimeError, TokenSource};
use telecare_rest::BackendClient;
use telecare_session::{ActivityMonitor, SessionManager};

/// Adapts the REST client to the realtime handshake seam.
struct BackendTokenSource {
    client: BackendClient,
}

#[async_trait]
impl TokenSource for BackendTokenSource {
    async fn connection_token(&self) -> Result<String, RealtimeError> {
        self.client
            .realtime_token()
            .await
            .map_err(|e| RealtimeError::Handshake(e.to_string()))
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telecare=info,telecare_console=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PortalConfig::from_env();

    let bus = Arc::new(EventBus::default());
    let client = BackendClient::new(&config.backend_url, Arc::clone(&bus));

    let Some(token) = config.session_token.clone() else {
        tracing::error!("SESSION_TOKEN environment variable is required");
        std::process::exit(1);
    };
    client.set_session(Some(token));

    let manager = Arc::new(SessionManager::new(client.clone(), Arc::clone(&bus)));
    let user = match manager.sign_in().await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, "Sign-in failed");
            std::process::exit(1);
        }
    };

    tracing::info!(
        user_id = user.id,
        name = %user.name,
        backend = %config.backend_url,
        "Starting telecare-console",
    );

    // Inactivity monitor: transitions go through the session manager,
    // and every user-initiated request resets the countdown.
    let monitor = Arc::new(ActivityMonitor::new());
    if let Err(e) = monitor.init(config.inactivity_minutes, manager.monitor_callbacks()) {
        tracing::error!(error = %e, "Invalid inactivity configuration");
        std::process::exit(1);
    }
    {
        let monitor = Arc::clone(&monitor);
        client.set_activity_hook(Arc::new(move || monitor.reset(false)));
    }
    monitor.start();

    // Claim store, hydrated from the backend.
    let store = Arc::new(ClaimStore::new(
        Arc::new(ClaimsApi::new(client.clone())),
        Arc::clone(&bus),
    ));
    if let Err(e) = store.hydrate().await {
        tracing::error!(error = %e, "Failed to hydrate claims");
        std::process::exit(1);
    }
    tracing::info!(count = store.claims().len(), "Claims hydrated");

    let notes = match UnreadNotes::load(&config.notes_path) {
        Ok(notes) => Arc::new(notes),
        Err(e) => {
            tracing::error!(error = %e, path = %config.notes_path.display(), "Failed to load unread notes");
            std::process::exit(1);
        }
    };

    // Realtime channel: claim pushes for this provider funnel into the
    // store's remote-event entry point.
    let channel = Arc::new(RealtimeChannel::new(
        ChannelConfig::new(&config.ws_url),
        Arc::new(BackendTokenSource {
            client: client.clone(),
        }),
        Arc::clone(&bus),
    ));
    let push_callback: Callback = {
        let store = Arc::clone(&store);
        Arc::new(move |data| match parse_event(data) {
            Ok(event) => store.apply_remote(event),
            Err(e) => tracing::warn!(error = %e, "Unknown claim push"),
        })
    };
    let subscription = channel.track("monolith", &format!("user-{}", user.id), push_callback);

    // Drive the session from bus events until it ends.
    let mut events = bus.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, signing out");
                if let Err(e) = manager.sign_out().await {
                    tracing::error!(error = %e, "Sign-out failed");
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(PortalEvent::Notice { level, message }) => match level {
                    NoticeLevel::Error => tracing::error!("{message}"),
                    NoticeLevel::Warning => tracing::warn!("{message}"),
                    NoticeLevel::Info => tracing::info!("{message}"),
                },
                Ok(PortalEvent::SignOutWarning) => {
                    tracing::warn!("Signing out in 60 seconds unless activity resumes");
                }
                Ok(PortalEvent::ClaimAdded { claim }) => {
                    tracing::info!(
                        customer_id = claim.customer_id,
                        route = %claim.route(),
                        "Claim added",
                    );
                }
                Ok(PortalEvent::ClaimRemoved { customer_id, switch_view }) => {
                    if let Err(e) = notes.clear(customer_id) {
                        tracing::warn!(error = %e, "Failed to clear unread notes");
                    }
                    tracing::info!(customer_id, switch_view, "Claim removed");
                }
                Ok(PortalEvent::SignedIn { user }) => {
                    tracing::info!(user_id = user.id, "Signed in");
                }
                Ok(PortalEvent::SignedOut) => {
                    monitor.stop();
                    channel.untrack(&subscription);
                    channel.shutdown();
                    store.clear();
                    tracing::info!("Session ended");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event bus receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

//! Application State
//!
//! Shared state accessible by all handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{ConnectionAuthenticator, IdentityService, TokenVerifier};
use crate::config::Config;
use crate::provider::RealtimeDataProvider;
use crate::websocket::{ProtocolHandler, PushScheduler, SessionRegistry};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions and subscriptions
    pub registry: Arc<SessionRegistry>,
    /// Per-session push jobs
    pub scheduler: Arc<PushScheduler>,
    /// Client command handling and teardown
    pub protocol: Arc<ProtocolHandler>,
    /// WebSocket handshake authentication
    pub authenticator: Arc<ConnectionAuthenticator>,
    /// Bearer verification for operator endpoints
    pub verifier: TokenVerifier,
    /// Session admission limit checked before upgrading
    pub max_sessions: usize,
    /// Frame write timeout for out-of-band writes
    pub send_timeout: Duration,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire the realtime subsystem from configuration and its collaborators
    pub fn new(
        config: &Config,
        provider: Arc<dyn RealtimeDataProvider>,
        identity: Arc<dyn IdentityService>,
    ) -> Self {
        let registry_config = config.realtime.registry_config();
        let max_sessions = registry_config.max_sessions;
        let send_timeout = registry_config.send_timeout;

        let registry = Arc::new(SessionRegistry::new(registry_config));
        let scheduler = PushScheduler::new(
            Arc::clone(&registry),
            provider,
            config.realtime.scheduler_config(&config.provider),
        );
        let protocol = Arc::new(ProtocolHandler::new(
            Arc::clone(&registry),
            Arc::clone(&scheduler),
            config.realtime.interval_policy(),
        ));

        let verifier = TokenVerifier::new(&config.auth.jwt_secret);
        let authenticator = Arc::new(ConnectionAuthenticator::new(
            verifier.clone(),
            identity,
            config.auth.authenticator_config(),
        ));

        Self {
            registry,
            scheduler,
            protocol,
            authenticator,
            verifier,
            max_sessions,
            send_timeout,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket session count
    pub async fn session_count(&self) -> usize {
        self.registry.session_count().await
    }
}

//! # OpsPulse
//!
//! Real-time operational metrics delivery - authenticated WebSocket sessions
//! that receive periodic pushes of live measurements for one company scope.
//!
//! ## Features
//!
//! - **Authenticated handshake**: JWT verification and company-scope lookup
//!   before the upgrade is accepted
//! - **Session registry**: lookup by session, company and topic
//! - **Periodic push**: one cancellable fetch-and-push job per session on a
//!   bounded worker pool
//! - **Isolation**: one session's failure never affects another
//!
//! ## Modules
//!
//! - [`auth`]: Credential extraction, token verification, identity lookup
//! - [`provider`]: Real-time data provider collaborator
//! - [`websocket`]: Sessions, registry, scheduler and client protocol
//! - [`api`]: HTTP server with Axum
//! - [`config`]: File and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use opspulse::auth::HttpIdentityService;
//! use opspulse::provider::HttpRealtimeProvider;
//! use opspulse::{serve, AppState, Config};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     config.validate()?;
//!
//!     let provider = Arc::new(HttpRealtimeProvider::new(config.provider.provider_config())?);
//!     let identity = Arc::new(HttpIdentityService::new(config.auth.identity_config())?);
//!
//!     let state = AppState::new(&config, provider, identity);
//!     serve(state, &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod provider;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};

pub use auth::{AuthError, ConnectionAuthenticator, ConnectionContext, TokenVerifier};

pub use config::{Config, ConfigError};

pub use provider::{MetricPoint, ProviderError, RealtimeDataProvider};

pub use websocket::{
    Envelope, MessageType, ProtocolHandler, PushScheduler, Session, SessionRegistry, TopicKey,
};

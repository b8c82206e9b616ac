//! OpsPulse HTTP API
//!
//! HTTP surface for the realtime subsystem, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /api/v1/ws` - Authenticated real-time connection
//!
//! ## Realtime
//! - `GET /api/v1/realtime/stats` - Live session and job counts
//! - `GET /api/v1/realtime/topics` - Subscriber count for one topic
//! - `POST /api/v1/realtime/notify` - Operator notice (admin only)
//!
//! ## Health
//! - `GET /health/live` - Liveness check
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use opspulse::api::{serve, AppState};
//! use opspulse::auth::{HttpIdentityService, IdentityService};
//! use opspulse::provider::{HttpRealtimeProvider, RealtimeDataProvider};
//! use opspulse::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default();
//!     let provider: Arc<dyn RealtimeDataProvider> =
//!         Arc::new(HttpRealtimeProvider::new(config.provider.provider_config())?);
//!     let identity: Arc<dyn IdentityService> =
//!         Arc::new(HttpIdentityService::new(config.auth.identity_config())?);
//!
//!     let state = AppState::new(&config, provider, identity);
//!     serve(state, &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
///
/// An empty `cors_origins` list allows any origin.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let api_routes = Router::new()
        // WebSocket route
        .route("/ws", get(websocket_handler))
        // Realtime observability and operator routes
        .route("/realtime/stats", get(routes::realtime::stats))
        .route("/realtime/topics", get(routes::realtime::topic_stats))
        .route("/realtime/notify", post(routes::realtime::notify));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(shared_state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server
///
/// Push jobs are stopped once the listener has drained.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let scheduler = Arc::clone(&state.scheduler);
    let router = build_router(state, &config.cors_origins);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("OpsPulse API listening on {}", addr);

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)));

    scheduler.shutdown().await;
    result?;

    tracing::info!("OpsPulse API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

//! Realtime Routes
//!
//! Observability and operator endpoints for the WebSocket subsystem.
//!
//! - GET /api/v1/realtime/stats - Session, company and job counts
//! - GET /api/v1/realtime/topics - Subscriber count for one topic
//! - POST /api/v1/realtime/notify - Push an operator notice (admin only)

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{
    NotifyRequest, NotifyResponse, RealtimeStatsResponse, TopicStatsQuery, TopicStatsResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::auth::{extract_credential, AuthError};
use crate::websocket::{Envelope, TopicKey};

const ADMIN_ROLE: &str = "admin";

/// GET /api/v1/realtime/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<RealtimeStatsResponse> {
    Json(RealtimeStatsResponse {
        sessions: state.registry.session_count().await,
        companies: state.registry.company_counts().await.into_iter().collect(),
        topics: state.registry.topic_count().await,
        active_jobs: state.scheduler.job_count().await,
    })
}

/// GET /api/v1/realtime/topics?company=&measurement=&gatewayId=
pub async fn topic_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopicStatsQuery>,
) -> Json<TopicStatsResponse> {
    let topic = TopicKey::new(&query.company, &query.measurement, &query.gateway_id);
    let subscribers = state.registry.topic_subscriber_count(&topic).await;

    Json(TopicStatsResponse {
        company: query.company,
        measurement: query.measurement,
        gateway_id: query.gateway_id,
        subscribers,
    })
}

/// POST /api/v1/realtime/notify
///
/// Deliver a notice to one company's sessions, or to every session when no
/// company is given. Requires a bearer token with the `admin` role.
pub async fn notify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NotifyRequest>,
) -> ApiResult<Json<NotifyResponse>> {
    let token = extract_credential(None, &headers)?;
    let claims = state.verifier.verify(&token)?;
    if claims.role() != ADMIN_ROLE {
        let reason = format!("role {} cannot send notices", claims.role());
        return Err(AuthError::Forbidden(reason).into());
    }

    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("message must not be empty".to_string()));
    }

    let company = req.company.as_deref().filter(|c| !c.is_empty());
    let envelope = Envelope::notice(company, req.message);
    let delivered = match company {
        Some(company) => state.registry.send_to_company(company, &envelope).await,
        None => state.registry.broadcast_to_all(&envelope).await,
    };

    tracing::info!(
        operator = %claims.sub,
        company = company.unwrap_or("*"),
        delivered,
        "Operator notice sent"
    );

    Ok(Json(NotifyResponse { delivered }))
}

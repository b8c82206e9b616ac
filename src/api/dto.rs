//! Data Transfer Objects
//!
//! Request and response types for the HTTP endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================
// REALTIME DTOs
// ============================================

/// Live session statistics
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeStatsResponse {
    /// Total live sessions
    pub sessions: usize,
    /// Live sessions per company scope
    pub companies: BTreeMap<String, usize>,
    /// Topics with at least one subscriber
    pub topics: usize,
    /// Running push jobs
    pub active_jobs: usize,
}

/// Topic lookup query
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStatsQuery {
    pub company: String,
    pub measurement: String,
    pub gateway_id: String,
}

/// Subscriber count for one topic
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStatsResponse {
    pub company: String,
    pub measurement: String,
    pub gateway_id: String,
    pub subscribers: usize,
}

/// Operator notice request
#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    /// Restrict delivery to one company scope; everyone when absent
    #[serde(default)]
    pub company: Option<String>,
    /// Notice text
    pub message: String,
}

/// Operator notice result
#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    /// Sessions the notice was delivered to
    pub delivered: usize,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: healthy
    pub status: String,
    /// Live realtime sessions
    pub sessions: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}

//! WebSocket Message Types
//!
//! Every frame exchanged with a dashboard is JSON. Clients send a small
//! `{"action": ...}` request; the server always answers with an [`Envelope`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::session::TopicKey;

/// Kind of an envelope, serialized as its lowercase name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Connection,
    Realtime,
    Subscribe,
    Unsubscribe,
    Ping,
    Pong,
    Error,
}

/// The single structure carrying every server→client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// "success" or "error"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
    /// Opaque payload (realtime points, subscription details)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Server-side send time in milliseconds since epoch
    pub timestamp: i64,
    /// Human-readable text, set on errors and notices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Forward-compatible extension fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

impl Envelope {
    fn new(kind: MessageType, status: &str) -> Self {
        Self {
            kind,
            status: status.to_string(),
            company: None,
            measurement: None,
            gateway_id: None,
            data: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
            message: None,
            extra: Map::new(),
        }
    }

    fn with_topic(mut self, topic: &TopicKey) -> Self {
        self.company = Some(topic.company.clone());
        self.measurement = Some(topic.measurement.clone());
        self.gateway_id = Some(topic.gateway_id.clone());
        self
    }

    /// Sent once, right after the session is registered
    pub fn connection_success(session_id: &str, company: &str) -> Self {
        let mut env = Self::new(MessageType::Connection, STATUS_SUCCESS);
        env.company = Some(company.to_string());
        env.message = Some("connected".to_string());
        env.extra
            .insert("sessionId".to_string(), Value::String(session_id.to_string()));
        env
    }

    /// Fresh data for a topic, produced by a scheduler tick
    pub fn realtime_data(topic: &TopicKey, data: Value) -> Self {
        let mut env = Self::new(MessageType::Realtime, STATUS_SUCCESS).with_topic(topic);
        env.data = Some(data);
        env
    }

    pub fn subscribe_success(topic: &TopicKey, interval_secs: u64) -> Self {
        let mut env = Self::new(MessageType::Subscribe, STATUS_SUCCESS).with_topic(topic);
        env.data = Some(serde_json::json!({ "interval": interval_secs }));
        env.message = Some(format!("subscribed, pushing every {}s", interval_secs));
        env
    }

    pub fn unsubscribe_success(topic: Option<&TopicKey>) -> Self {
        let env = Self::new(MessageType::Unsubscribe, STATUS_SUCCESS);
        let mut env = match topic {
            Some(topic) => env.with_topic(topic),
            None => env,
        };
        env.message = Some("unsubscribed".to_string());
        env
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, STATUS_SUCCESS)
    }

    /// Protocol-level error; the connection stays open
    pub fn error(message: impl Into<String>) -> Self {
        let mut env = Self::new(MessageType::Error, STATUS_ERROR);
        env.message = Some(message.into());
        env
    }

    /// Data-fetch error for a topic; the subscription keeps ticking
    pub fn topic_error(topic: &TopicKey, message: impl Into<String>) -> Self {
        let mut env = Self::error(message).with_topic(topic);
        env.extra
            .insert("source".to_string(), Value::String("provider".to_string()));
        env
    }

    /// Operator notice pushed to a company or to everyone
    pub fn notice(company: Option<&str>, message: impl Into<String>) -> Self {
        let mut env = Self::new(MessageType::Connection, STATUS_SUCCESS);
        env.company = company.map(str::to_string);
        env.message = Some(message.into());
        env.extra.insert("notice".to_string(), Value::Bool(true));
        env
    }

    /// Serialize to a text frame
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Raw client request as it appears on the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientRequest {
    action: Option<String>,
    measurement: Option<String>,
    gateway_id: Option<String>,
    interval: Option<i64>,
}

/// A validated client command
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Subscribe {
        measurement: String,
        gateway_id: String,
        /// Requested push cadence in seconds, range-checked by the handler
        interval: Option<i64>,
    },
    Unsubscribe {
        measurement: Option<String>,
        gateway_id: Option<String>,
    },
    Ping,
}

/// Errors in a client request. Reported in-band, never fatal.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    Malformed(String),

    #[error("Missing action")]
    MissingAction,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Interval {interval}s out of range, must be between {min} and {max} seconds")]
    IntervalOutOfRange { interval: i64, min: u64, max: u64 },

    #[error("Binary messages not supported")]
    Binary,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ClientCommand {
    /// Parse a text frame into a command
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let req: ClientRequest =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let action = non_empty(req.action).ok_or(ProtocolError::MissingAction)?;

        match action.as_str() {
            "subscribe" => Ok(ClientCommand::Subscribe {
                measurement: non_empty(req.measurement)
                    .ok_or(ProtocolError::MissingField("measurement"))?,
                gateway_id: non_empty(req.gateway_id)
                    .ok_or(ProtocolError::MissingField("gatewayId"))?,
                interval: req.interval,
            }),
            "unsubscribe" => Ok(ClientCommand::Unsubscribe {
                measurement: non_empty(req.measurement),
                gateway_id: non_empty(req.gateway_id),
            }),
            "ping" => Ok(ClientCommand::Ping),
            _ => Err(ProtocolError::UnknownAction(action)),
        }
    }
}

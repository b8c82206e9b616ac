//! Real-Time Data Provider
//!
//! The push scheduler pulls fresh points through [`RealtimeDataProvider`].
//! The time-series query layer itself lives elsewhere; [`HttpRealtimeProvider`]
//! talks to it over HTTP.

mod http;

pub use http::{HttpRealtimeProvider, ProviderConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Source of "as of now" data for a topic
#[async_trait]
pub trait RealtimeDataProvider: Send + Sync {
    /// Fetch the latest points for `(company, measurement, gatewayId)`
    async fn fetch_realtime(
        &self,
        company: &str,
        measurement: &str,
        gateway_id: &str,
    ) -> Result<Vec<MetricPoint>, ProviderError>;
}

/// One data point as returned by the time-series layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Timestamp in milliseconds
    pub timestamp: i64,
    /// Field values (e.g. `usage_idle`, `used_percent`), passed through untouched
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MetricPoint {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            fields: Map::new(),
        }
    }

    /// Builder: add a field
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

/// Errors fetching real-time data
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Data provider timed out")]
    Timeout,

    #[error("Data provider unavailable: {0}")]
    Unavailable(String),

    #[error("Data provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid data provider response: {0}")]
    Parse(String),
}

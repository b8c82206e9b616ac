//! HTTP adapter for the time-series query layer.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{MetricPoint, ProviderError, RealtimeDataProvider};

/// Configuration for the HTTP data provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the query service (e.g., "http://localhost:8086")
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8086".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Fetches real-time points with `GET {base}/realtime?company=&measurement=&gatewayId=`
pub struct HttpRealtimeProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpRealtimeProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn realtime_url(&self) -> String {
        format!("{}/realtime", self.config.base_url.trim_end_matches('/'))
    }
}

fn map_request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else if e.is_connect() {
        ProviderError::Unavailable(e.to_string())
    } else if e.is_decode() {
        ProviderError::Parse(e.to_string())
    } else {
        ProviderError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl RealtimeDataProvider for HttpRealtimeProvider {
    async fn fetch_realtime(
        &self,
        company: &str,
        measurement: &str,
        gateway_id: &str,
    ) -> Result<Vec<MetricPoint>, ProviderError> {
        let response = self
            .client
            .get(self.realtime_url())
            .query(&[
                ("company", company),
                ("measurement", measurement),
                ("gatewayId", gateway_id),
            ])
            .send()
            .await
            .map_err(map_request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        response.json().await.map_err(map_request_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use std::collections::HashMap;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: String) -> HttpRealtimeProvider {
        HttpRealtimeProvider::new(ProviderConfig {
            base_url,
            request_timeout_ms: 2_000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_passes_topic_as_query() {
        let router = Router::new().route(
            "/realtime",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                Json(serde_json::json!([{
                    "timestamp": 1_700_000_000_000i64,
                    "company": params["company"],
                    "measurement": params["measurement"],
                    "gateway": params["gatewayId"],
                }]))
            }),
        );
        let base = spawn_server(router).await;

        let points = provider(base).fetch_realtime("acme", "cpu", "gw-1").await.unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, 1_700_000_000_000);
        assert_eq!(points[0].fields["company"], "acme");
        assert_eq!(points[0].fields["measurement"], "cpu");
        assert_eq!(points[0].fields["gateway"], "gw-1");
    }

    #[tokio::test]
    async fn test_fetch_maps_error_status() {
        let router = Router::new().route(
            "/realtime",
            get(|| async { (StatusCode::BAD_GATEWAY, "influx down") }),
        );
        let base = spawn_server(router).await;

        let err = provider(base).fetch_realtime("acme", "cpu", "gw-1").await.unwrap_err();
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "influx down");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind and drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(format!("http://{}", addr))
            .fetch_realtime("acme", "cpu", "gw-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn test_url_trailing_slash() {
        let p = provider("http://tsdb:8086/".to_string());
        assert_eq!(p.realtime_url(), "http://tsdb:8086/realtime");
    }
}

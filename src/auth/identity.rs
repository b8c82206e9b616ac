//! Identity service collaborator.
//!
//! Resolves which company a verified caller belongs to.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::AuthError;

/// Maps an identity to its company scope
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// `Ok(None)` when the identity has no company
    ///
    /// `token` is the caller's verified credential, forwarded as-is.
    async fn resolve_company_scope(
        &self,
        identity: &str,
        role: &str,
        token: &str,
    ) -> Result<Option<String>, AuthError>;
}

/// Configuration for the HTTP identity service
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL (e.g., "http://localhost:9000")
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            request_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompanyScopeResponse {
    #[serde(default)]
    company: Option<String>,
}

/// `GET {base}/company-scope?identity=&role=` → `{"company": "..."}`
///
/// The caller's bearer token is passed through to the identity service.
pub struct HttpIdentityService {
    client: Client,
    config: IdentityConfig,
}

impl HttpIdentityService {
    pub fn new(config: IdentityConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn scope_url(&self) -> String {
        format!("{}/company-scope", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn resolve_company_scope(
        &self,
        identity: &str,
        role: &str,
        token: &str,
    ) -> Result<Option<String>, AuthError> {
        let response = self
            .client
            .get(self.scope_url())
            .query(&[("identity", identity), ("role", role)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
            if e.is_timeout() {
                    AuthError::IdentityTimeout
                } else {
                    AuthError::IdentityService(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: CompanyScopeResponse = response
                    .json()
                    .await
                    .map_err(|e| AuthError::IdentityService(e.to_string()))?;
                Ok(body.company.filter(|c| !c.trim().is_empty()))
            }
            status => Err(AuthError::IdentityService(format!(
                "unexpected status {}",
                status.as_u16()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query,
        http::{header::AUTHORIZATION, HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;

    const CALLER_TOKEN: &str = "caller.jwt.token";

    async fn spawn_service() -> String {
        let router = Router::new().route(
            "/company-scope",
            get(|Query(params): Query<HashMap<String, String>>, headers: HeaderMap| async move {
                let expected = format!("Bearer {}", CALLER_TOKEN);
                let authorized = headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v == expected);
                if !authorized {
                    return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({})));
                }

                match params.get("identity").map(String::as_str) {
                    Some("alice") => (
                        StatusCode::OK,
                        Json(serde_json::json!({ "company": "acme.com" })),
                    ),
                    Some("blank") => (StatusCode::OK, Json(serde_json::json!({ "company": "" }))),
                    Some("broken") => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({})),
                    ),
                    _ => (StatusCode::NOT_FOUND, Json(serde_json::json!({}))),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn service(base_url: String) -> HttpIdentityService {
        HttpIdentityService::new(IdentityConfig {
            base_url,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolves_company() {
        let svc = service(spawn_service().await);
        let company = svc.resolve_company_scope("alice", "user", CALLER_TOKEN).await.unwrap();
        assert_eq!(company.as_deref(), Some("acme.com"));
    }

    #[tokio::test]
    async fn test_not_found_and_blank_are_none() {
        let svc = service(spawn_service().await);
        let nobody = svc.resolve_company_scope("nobody", "user", CALLER_TOKEN).await;
        let blank = svc.resolve_company_scope("blank", "user", CALLER_TOKEN).await;
        assert_eq!(nobody.unwrap(), None);
        assert_eq!(blank.unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_error_is_error() {
        let svc = service(spawn_service().await);
        let result = svc.resolve_company_scope("broken", "user", CALLER_TOKEN).await;
        assert!(matches!(result, Err(AuthError::IdentityService(_))));
    }

    #[tokio::test]
    async fn test_forwards_caller_token() {
        let svc = service(spawn_service().await);

        // The mock only answers when it sees the caller's own bearer token
        let result = svc.resolve_company_scope("alice", "user", "someone.else").await;
        assert!(matches!(result, Err(AuthError::IdentityService(_))));

        let company = svc
            .resolve_company_scope("alice", "user", CALLER_TOKEN)
            .await
            .unwrap();
        assert_eq!(company.as_deref(), Some("acme.com"));
    }
}

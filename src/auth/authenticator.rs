//! Handshake authenticator.

use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

use super::{extract_credential, AuthError, ConnectionContext, IdentityService, TokenVerifier};

/// Configuration for the connection authenticator
#[derive(Debug, Clone)]
pub struct AuthenticatorConfig {
    /// Upper bound on the identity-service lookup
    pub identity_timeout: Duration,
    /// Domain suffixes stripped from resolved company scopes
    pub strip_suffixes: Vec<String>,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            identity_timeout: Duration::from_secs(5),
            strip_suffixes: vec![".com".to_string()],
        }
    }
}

/// Strip trailing domain suffixes from a company scope
///
/// Suffixes are matched case-insensitively and removed repeatedly, so the
/// result never ends in one of them. Returns `None` if nothing is left.
pub fn normalize_company(raw: &str, suffixes: &[String]) -> Option<String> {
    let mut company = raw.trim();

    'strip: loop {
        for suffix in suffixes.iter().filter(|s| !s.is_empty()) {
            let split = company.len().saturating_sub(suffix.len());
            if company.len() >= suffix.len()
                && company.is_char_boundary(split)
                && company[split..].eq_ignore_ascii_case(suffix)
            {
                company = company[..split].trim_end();
                continue 'strip;
            }
        }
        break;
    }

    if company.is_empty() {
        None
    } else {
        Some(company.to_string())
    }
}

/// Admits or rejects WebSocket handshakes
pub struct ConnectionAuthenticator {
    verifier: TokenVerifier,
    identity: Arc<dyn IdentityService>,
    config: AuthenticatorConfig,
}

impl ConnectionAuthenticator {
    pub fn new(
        verifier: TokenVerifier,
        identity: Arc<dyn IdentityService>,
        config: AuthenticatorConfig,
    ) -> Self {
        Self {
            verifier,
            identity,
            config,
        }
    }

    /// Authenticate a handshake from its raw query string and headers
    pub async fn authenticate(
        &self,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<ConnectionContext, AuthError> {
        let token = extract_credential(query, headers)?;
        let claims = self.verifier.verify(&token)?;
        let identity = claims.sub.clone();
        let role = claims.role().to_string();

        let resolved = tokio::time::timeout(
            self.config.identity_timeout,
            self.identity.resolve_company_scope(&identity, &role, &token),
        )
        .await
        .map_err(|_| AuthError::IdentityTimeout)??;

        let company = resolved
            .and_then(|raw| normalize_company(&raw, &self.config.strip_suffixes))
            .ok_or_else(|| AuthError::CompanyNotFound(identity.clone()))?;

        tracing::debug!(
            identity = %identity,
            role = %role,
            company = %company,
            "Handshake authenticated"
        );

        Ok(ConnectionContext {
            company,
            identity,
            role,
            token,
        })
    }
}

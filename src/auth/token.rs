//! Bearer credential extraction and JWT verification.

use axum::extract::Query;
use axum::http::{header::AUTHORIZATION, HeaderMap, Uri};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Query parameters checked for a credential, in order of precedence
const QUERY_TOKEN_KEYS: [&str; 2] = ["accessToken", "token"];

const DEFAULT_ROLE: &str = "user";

/// JWT claims carried by dashboard credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Caller identity
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl Claims {
    /// Effective role: `role`, else the first of `roles`, else "user"
    pub fn role(&self) -> &str {
        self.role
            .as_deref()
            .or_else(|| self.roles.first().map(String::as_str))
            .unwrap_or(DEFAULT_ROLE)
    }
}

fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Decode a raw query string with the same rules as axum's `Query` extractor
fn query_pairs(query: &str) -> Vec<(String, String)> {
    let Ok(uri) = format!("/?{}", query).parse::<Uri>() else {
        return Vec::new();
    };
    Query::<Vec<(String, String)>>::try_from_uri(&uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default()
}

/// Find the bearer credential on a handshake request
///
/// Precedence: `accessToken` query parameter, `token` query parameter,
/// then the `Authorization: Bearer` header.
pub fn extract_credential(query: Option<&str>, headers: &HeaderMap) -> Result<String, AuthError> {
    if let Some(query) = query {
        let pairs = query_pairs(query);
        for key in QUERY_TOKEN_KEYS {
            // First non-empty value wins when a key repeats
            if let Some((_, token)) = pairs
                .iter()
                .find(|(name, value)| name == key && !value.is_empty())
            {
                return Ok(token.clone());
            }
        }
    }

    match headers.get(AUTHORIZATION) {
        Some(value) => {
            let value = value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;
            bearer_token_from_header(value).map(str::to_string)
        }
        None => Err(AuthError::MissingCredential),
    }
}

/// Verifies (and, for tooling, issues) HS256 tokens with a shared secret
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Check signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.required_spec_claims.clear();
        validation.required_spec_claims.insert("exp".to_string());

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = ?e, "JWT validation failed");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }
        Ok(data.claims)
    }

    /// Mint a token valid for `ttl_secs`
    pub fn issue(&self, sub: &str, role: &str, ttl_secs: i64) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            exp: now + ttl_secs,
            iat: Some(now),
            role: Some(role.to_string()),
            roles: Vec::new(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        headers
    }

    #[test]
    fn test_access_token_takes_precedence() {
        let headers = headers_with("Bearer from-header");
        let token = extract_credential(Some("token=fallback&accessToken=primary"), &headers);
        assert_eq!(token.unwrap(), "primary");
    }

    #[test]
    fn test_token_query_fallback() {
        let headers = headers_with("Bearer from-header");
        let token = extract_credential(Some("foo=bar&token=fallback"), &headers);
        assert_eq!(token.unwrap(), "fallback");
    }

    #[test]
    fn test_header_used_without_query() {
        let headers = headers_with("bearer abc.def.ghi");
        let token = extract_credential(Some("foo=bar&accessToken="), &headers);
        assert_eq!(token.unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_query_token_is_url_decoded() {
        let token = extract_credential(Some("accessToken=a%2Bb%3D"), &HeaderMap::new());
        assert_eq!(token.unwrap(), "a+b=");

        // Form encoding: a literal plus is a space
        let token = extract_credential(Some("accessToken=a+b"), &HeaderMap::new());
        assert_eq!(token.unwrap(), "a b");
    }

    #[test]
    fn test_repeated_query_key_uses_first_value() {
        let token = extract_credential(Some("token=&token=second&token=third"), &HeaderMap::new());
        assert_eq!(token.unwrap(), "second");
    }

    #[test]
    fn test_missing_credential() {
        let result = extract_credential(None, &HeaderMap::new());
        assert!(matches!(result, Err(AuthError::MissingCredential)));
    }

    #[test]
    fn test_malformed_header() {
        for case in ["Basic abc", "Bearer", "Bearer a b"] {
            let result = extract_credential(None, &headers_with(case));
            assert!(
                matches!(result, Err(AuthError::InvalidAuthHeader)),
                "case {:?} should be rejected",
                case
            );
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let verifier = TokenVerifier::new("test-secret");
        let token = verifier.issue("alice", "admin", 3600).unwrap();

        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role(), "admin");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenVerifier::new("secret-a").issue("alice", "user", 3600).unwrap();
        let result = TokenVerifier::new("secret-b").verify(&token);
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = TokenVerifier::new("test-secret");
        let token = verifier.issue("alice", "user", -60).unwrap();
        assert!(matches!(verifier.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_garbage_rejected() {
        let verifier = TokenVerifier::new("test-secret");
        assert!(matches!(
            verifier.verify("not-a-jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_role_fallbacks() {
        let mut claims = Claims {
            sub: "alice".to_string(),
            exp: 0,
            iat: None,
            role: None,
            roles: vec!["operator".to_string()],
        };
        assert_eq!(claims.role(), "operator");
        claims.roles.clear();
        assert_eq!(claims.role(), "user");
    }
}

//! Bearer Credential Verification
//!
//! Token issuance lives outside this service. The server only needs a
//! [`TokenVerifier`] that turns a presented credential into a [`UserId`];
//! [`JwtVerifier`] is the HS256 implementation used by the binary.
//!
//! Credentials are read from `Authorization: Bearer <token>` first. WebSocket
//! upgrades may fall back to a `?token=` query parameter because browsers cannot
//! set arbitrary headers on the upgrade request.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::UserId;

/// Errors produced while verifying a credential
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token subject is not a valid user id: {0}")]
    InvalidSubject(String),
}

/// Validates a bearer credential and yields the subject it was issued to
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<UserId, AuthError>;
}

/// JWT claims accepted by [`JwtVerifier`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user id
    #[serde(alias = "user_id")]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Expiration (Unix seconds)
    pub exp: u64,
    #[serde(default)]
    pub iat: u64,
}

/// HS256 JWT verifier with a shared secret
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(credential, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        data.claims
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidSubject(data.claims.sub.clone()))
    }
}

/// Extract the token from an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify the header credential, falling back to a query-string token.
///
/// The fallback is also tried when the header token is present but rejected.
pub fn authenticate(
    verifier: &dyn TokenVerifier,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<UserId, AuthError> {
    let header_result = bearer_token(headers).map(|token| verifier.verify(token));
    if let Some(Ok(user)) = header_result {
        return Ok(user);
    }

    match query_token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => verifier.verify(token),
        None => match header_result {
            Some(Err(e)) => Err(e),
            _ => Err(AuthError::MissingCredential),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token_for(sub: &str, secret: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            username: Some("minty_68".to_string()),
            exp: (now + exp_offset) as u64,
            iat: now as u64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_verify_valid_token() {
        let user = UserId::new();
        let verifier = JwtVerifier::new(SECRET);
        let token = token_for(&user.to_string(), SECRET, 3600);

        assert_eq!(verifier.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let verifier = JwtVerifier::new(SECRET);
        let token = token_for(&UserId::new().to_string(), "other", 3600);

        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let verifier = JwtVerifier::new(SECRET);
        let token = token_for(&UserId::new().to_string(), SECRET, -3600);

        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_verify_rejects_non_uuid_subject() {
        let verifier = JwtVerifier::new(SECRET);
        let token = token_for("65f0c0ffee", SECRET, 3600);

        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidSubject(_))));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_authenticate_prefers_header_then_query() {
        let verifier = JwtVerifier::new(SECRET);
        let header_user = UserId::new();
        let query_user = UserId::new();
        let header_token = token_for(&header_user.to_string(), SECRET, 3600);
        let query_token = token_for(&query_user.to_string(), SECRET, 3600);

        let headers = headers_with(&format!("Bearer {}", header_token));
        assert_eq!(
            authenticate(&verifier, &headers, Some(&query_token)).unwrap(),
            header_user
        );

        let bad_header = headers_with("Bearer garbage");
        assert_eq!(
            authenticate(&verifier, &bad_header, Some(&query_token)).unwrap(),
            query_user
        );

        assert_eq!(
            authenticate(&verifier, &HeaderMap::new(), Some(&query_token)).unwrap(),
            query_user
        );
    }

    #[test]
    fn test_authenticate_missing_credential() {
        let verifier = JwtVerifier::new(SECRET);
        assert!(matches!(
            authenticate(&verifier, &HeaderMap::new(), None),
            Err(AuthError::MissingCredential)
        ));
        assert!(matches!(
            authenticate(&verifier, &headers_with("Bearer nope"), None),
            Err(AuthError::InvalidToken(_))
        ));
    }
}

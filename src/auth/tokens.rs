// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Signed token minting and verification.
//!
//! Access tokens carry `{sub, type: "access", exp}`; refresh tokens
//! additionally carry the server-side `session_id` they are bound to.
//! Tokens are signed with an HMAC key (`JWT_SECRET_KEY`, HS256 by
//! default).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

/// Token errors surfaced to the auth service.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Signature invalid, structure broken, or expired
    #[error("Invalid or expired token")]
    Invalid,

    /// The configured algorithm name is not supported
    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// JWT claims for both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Owning user id
    pub sub: String,
    /// `access` or `refresh`
    #[serde(rename = "type")]
    pub token_type: String,
    /// Expiry as a unix timestamp (seconds)
    pub exp: i64,
    /// Server-side session binding; refresh tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Mints and verifies signed tokens.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Creates a signer from the configured secret and algorithm name.
    pub fn new(secret: &str, algorithm: &str) -> Result<Self, TokenError> {
        let algorithm = match algorithm.to_uppercase().as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => return Err(TokenError::UnsupportedAlgorithm(other.to_string())),
        };

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
        })
    }

    /// Mints an access token; returns the token and its expiry instant.
    pub fn mint_access(
        &self,
        user_id: &str,
        ttl: Duration,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        let expires_at = Utc::now() + ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            exp: expires_at.timestamp(),
            session_id: None,
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|_| TokenError::Invalid)?;
        Ok((token, expires_at))
    }

    /// Mints a refresh token bound to a session id.
    pub fn mint_refresh(
        &self,
        user_id: &str,
        session_id: &str,
        ttl: Duration,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        let expires_at = Utc::now() + ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            exp: expires_at.timestamp(),
            session_id: Some(session_id.to_string()),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|_| TokenError::Invalid)?;
        Ok((token, expires_at))
    }

    /// Decodes and verifies a token, enforcing signature and expiry.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        // The `type` claim stands in for audience/issuer checks
        validation.validate_aud = false;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("test-secret-key-at-least-32-bytes!!", "HS256").unwrap()
    }

    #[test]
    fn test_unsupported_algorithm() {
        let err = TokenSigner::new("secret", "RS256").unwrap_err();
        assert_eq!(err, TokenError::UnsupportedAlgorithm("RS256".to_string()));
    }

    #[test]
    fn test_access_round_trip() {
        let signer = signer();
        let (token, expires_at) = signer
            .mint_access("user-1", Duration::minutes(15))
            .unwrap();

        let claims = signer.decode(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.token_type, TOKEN_TYPE_ACCESS);
        assert_eq!(claims.exp, expires_at.timestamp());
        assert!(claims.session_id.is_none());
    }

    #[test]
    fn test_refresh_carries_session_id() {
        let signer = signer();
        let (token, _) = signer
            .mint_refresh("user-1", "sess-42", Duration::days(7))
            .unwrap();

        let claims = signer.decode(&token).unwrap();
        assert_eq!(claims.token_type, TOKEN_TYPE_REFRESH);
        assert_eq!(claims.session_id.as_deref(), Some("sess-42"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = signer();
        let (token, _) = signer
            .mint_access("user-1", Duration::seconds(-30))
            .unwrap();

        assert_eq!(signer.decode(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = signer();
        let (token, _) = signer.mint_access("user-1", Duration::minutes(15)).unwrap();

        let other = TokenSigner::new("a-completely-different-signing-key!", "HS256").unwrap();
        assert_eq!(other.decode(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_garbage_rejected() {
        let signer = signer();
        assert_eq!(
            signer.decode("not.a.token").unwrap_err(),
            TokenError::Invalid
        );
    }
}

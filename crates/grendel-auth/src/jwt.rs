//! Session token issuing and validation.
//!
//! Session tokens are HS256 JWTs carrying the username and role. Each token
//! has a unique `jti` so a signout can revoke it before it expires.
//!
//! A `kind` claim separates sign-in sessions, which belong to a stored
//! account, from API tokens, which carry their own role.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::AuthConfig;

/// Audience claim of session tokens.
pub const SESSION_AUDIENCE: &str = "grendel-api";

/// What a token was issued for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Issued on sign-in or sign-up for a stored account.
    #[default]
    Session,
    /// Issued by an administrator with an explicit role.
    Api,
}

/// Validated claims extracted from a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedClaims {
    /// The authenticated username (`sub` claim).
    pub username: String,
    /// The role recorded at issue time.
    pub role: String,
    /// Session or API token.
    pub kind: TokenKind,
    /// Unique token id (`jti` claim).
    pub token_id: String,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued session token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The encoded JWT.
    pub token: String,
    /// Unique token id.
    pub token_id: String,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// Trait for validating and revoking session tokens.
#[async_trait]
pub trait JwtValidator: Send + Sync {
    /// Validate a JWT and extract claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, expired, or revoked.
    async fn validate(&self, token: &str) -> Result<ValidatedClaims>;

    /// Revoke a validated token until it expires.
    fn revoke(&self, claims: &ValidatedClaims);
}

/// Raw claims as encoded in the JWT.
#[derive(Debug, Serialize, Deserialize)]
struct RawClaims {
    sub: String,
    role: String,
    kind: TokenKind,
    aud: String,
    jti: String,
    iat: i64,
    exp: i64,
}

/// HMAC-SHA256 session token issuer and validator.
pub struct HmacValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    default_ttl: Duration,
    revoked: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl HmacValidator {
    /// Create a validator from the shared secret in `config`.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret()),
            decoding: DecodingKey::from_secret(config.secret()),
            default_ttl: Duration::seconds(config.token_ttl_seconds),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a session token for `username` with `role`.
    ///
    /// Uses the configured TTL when `ttl` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if encoding fails.
    pub fn issue(&self, username: &str, role: &str, ttl: Option<Duration>) -> Result<IssuedToken> {
        self.issue_kind(TokenKind::Session, username, role, ttl.unwrap_or(self.default_ttl))
    }

    /// Issue an API token that grants `role` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if encoding fails.
    pub fn issue_api(&self, username: &str, role: &str, ttl: Duration) -> Result<IssuedToken> {
        self.issue_kind(TokenKind::Api, username, role, ttl)
    }

    fn issue_kind(
        &self,
        kind: TokenKind,
        username: &str,
        role: &str,
        ttl: Duration,
    ) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let token_id = uuid::Uuid::new_v4().to_string();

        let claims = RawClaims {
            sub: username.to_string(),
            role: role.to_string(),
            kind,
            aud: SESSION_AUDIENCE.to_string(),
            jti: token_id.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = self.encode_claims(&claims)?;

        tracing::debug!(username, role, ?kind, %expires_at, "Issued token");
        Ok(IssuedToken {
            token,
            token_id,
            expires_at,
        })
    }

    fn encode_claims(&self, claims: &RawClaims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    fn is_revoked(&self, token_id: &str) -> bool {
        self.revoked.read().contains_key(token_id)
    }
}

#[async_trait]
impl JwtValidator for HmacValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SESSION_AUDIENCE]);
        validation.leeway = 0;

        let claims = decode::<RawClaims>(token, &self.decoding, &validation)?.claims;

        if self.is_revoked(&claims.jti) {
            return Err(AuthError::TokenRevoked);
        }

        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::InvalidToken("invalid exp timestamp".to_string()))?;

        Ok(ValidatedClaims {
            username: claims.sub,
            role: claims.role,
            kind: claims.kind,
            token_id: claims.jti,
            expires_at,
        })
    }

    fn revoke(&self, claims: &ValidatedClaims) {
        let now = Utc::now();
        let mut revoked = self.revoked.write();
        revoked.retain(|_, expires_at| *expires_at > now);
        revoked.insert(claims.token_id.clone(), claims.expires_at);
    }
}

/// A mock JWT validator for testing.
///
/// This validator accepts any token in the format `test-token:<username>:<role>`
/// as a session token, and `test-api-token:<username>:<role>` as an API token.
/// The whole token string is used as the token id.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MockJwtValidator {
    revoked: parking_lot::Mutex<std::collections::HashSet<String>>,
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl JwtValidator for MockJwtValidator {
    async fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        // Expected format: test-token:<username>:<role>
        let (kind, rest) = if let Some(rest) = token.strip_prefix("test-token:") {
            (TokenKind::Session, rest)
        } else if let Some(rest) = token.strip_prefix("test-api-token:") {
            (TokenKind::Api, rest)
        } else {
            return Err(AuthError::InvalidToken(
                "expected test-token:<username>:<role>".to_string(),
            ));
        };

        let (username, role) = rest.split_once(':').ok_or_else(|| {
            AuthError::InvalidToken("expected test-token:<username>:<role>".to_string())
        })?;

        if self.revoked.lock().contains(token) {
            return Err(AuthError::TokenRevoked);
        }

        Ok(ValidatedClaims {
            username: username.to_string(),
            role: role.to_string(),
            kind,
            token_id: token.to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    fn revoke(&self, claims: &ValidatedClaims) {
        self.revoked.lock().insert(claims.token_id.clone());
    }
}

//! Authentication for grendel.
//!
//! This crate provides:
//!
//! - HS256 session tokens with revocation ([`HmacValidator`])
//! - Argon2id password hashing ([`password`])
//! - Role grant matching ([`permission`])
//! - Single-use boot tokens bound to a node interface ([`BootTokenSigner`])
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│   JwtValidator   │
//! │   (HTTP)         │     │   (trait)        │
//! └────────┬─────────┘     └────────┬─────────┘
//!          │                        │
//!          │               ┌────────▼─────────┐
//!          │               │  HmacValidator   │
//!          │               │  (shared secret) │
//!          │               └──────────────────┘
//!          │ /boot/:token
//!  ┌───────▼──────────┐
//!  │ BootTokenSigner  │
//!  │ (single use)     │
//!  └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use grendel_auth::{AuthConfig, HmacValidator, JwtValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = HmacValidator::new(&AuthConfig::default());
//!
//! let issued = validator.issue("admin", "admin", None)?;
//! let claims = validator.validate(&issued.token).await?;
//!
//! assert_eq!(claims.username, "admin");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod boot;
pub mod error;
pub mod jwt;
pub mod password;
pub mod permission;

use std::fmt;

use argon2::password_hash::rand_core::{OsRng, RngCore};
use base64::{engine::general_purpose, Engine as _};

pub use boot::{BootClaims, BootTokenSigner};
pub use error::{AuthError, Result};
pub use jwt::{HmacValidator, IssuedToken, JwtValidator, TokenKind, ValidatedClaims};
pub use password::{hash_password, verify_password};
pub use permission::is_allowed;

#[cfg(any(test, feature = "test-utils"))]
pub use jwt::MockJwtValidator;

/// Configuration for token signing.
#[derive(Clone)]
pub struct AuthConfig {
    secret: Vec<u8>,
    /// Session token lifetime, in seconds.
    pub token_ttl_seconds: i64,
    /// Boot token lifetime, in seconds.
    pub boot_token_ttl_seconds: i64,
}

impl AuthConfig {
    /// Default session token lifetime (8 hours).
    pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 8 * 60 * 60;

    /// Default boot token lifetime (15 minutes).
    pub const DEFAULT_BOOT_TOKEN_TTL_SECONDS: i64 = 15 * 60;

    /// Create a config with an explicit signing secret.
    #[must_use]
    pub fn with_secret(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_ttl_seconds: Self::DEFAULT_TOKEN_TTL_SECONDS,
            boot_token_ttl_seconds: Self::DEFAULT_BOOT_TOKEN_TTL_SECONDS,
        }
    }

    /// Create a config from a base64-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSecret` if the value is not base64 or
    /// decodes to fewer than 16 bytes.
    pub fn from_base64_secret(encoded: &str) -> Result<Self> {
        let secret = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::InvalidSecret(e.to_string()))?;
        if secret.len() < 16 {
            return Err(AuthError::InvalidSecret(
                "secret must be at least 16 bytes".to_string(),
            ));
        }
        Ok(Self::with_secret(secret))
    }

    /// Create a config with a random 32-byte secret.
    ///
    /// Tokens signed with a random secret do not survive a restart.
    #[must_use]
    pub fn random() -> Self {
        let mut secret = vec![0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::with_secret(secret)
    }

    /// The raw signing secret.
    #[must_use]
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("boot_token_ttl_seconds", &self.boot_token_ttl_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.secret().len(), 32);
        assert_eq!(config.token_ttl_seconds, 28_800);
        assert_eq!(config.boot_token_ttl_seconds, 900);
    }

    #[test]
    fn random_secrets_differ() {
        assert_ne!(AuthConfig::random().secret(), AuthConfig::random().secret());
    }

    #[test]
    fn base64_secret() {
        let config = AuthConfig::from_base64_secret("MDEyMzQ1Njc4OWFiY2RlZg==").unwrap();
        assert_eq!(config.secret(), b"0123456789abcdef");

        assert!(AuthConfig::from_base64_secret("c2hvcnQ=").is_err());
        assert!(AuthConfig::from_base64_secret("%%%").is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let config = AuthConfig::with_secret(b"very-secret-value".to_vec());
        assert!(!format!("{config:?}").contains("very-secret-value"));
    }

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(AuthError::TokenExpired.http_status_code(), 401);
        assert_eq!(AuthError::InvalidSignature.http_status_code(), 401);
        assert_eq!(AuthError::TokenReused.http_status_code(), 401);
        assert_eq!(AuthError::PermissionDenied.http_status_code(), 403);
        assert_eq!(AuthError::Internal("test".into()).http_status_code(), 500);
    }

    #[test]
    fn auth_error_retriable() {
        assert!(AuthError::TokenExpired.is_retriable());
        assert!(AuthError::TokenRevoked.is_retriable());
        assert!(!AuthError::InvalidSignature.is_retriable());
        assert!(!AuthError::PermissionDenied.is_retriable());
    }
}

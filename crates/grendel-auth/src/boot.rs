//! Single-use boot tokens.
//!
//! A boot token binds one node interface to a short-lived HS256 JWT. The
//! token is presented by the booting machine exactly once; a second
//! presentation of the same `jti` is rejected even before expiry.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::AuthConfig;

/// Audience claim of boot tokens.
pub const BOOT_AUDIENCE: &str = "grendel-boot";

/// Claims carried by a boot token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootClaims {
    /// Node uid.
    pub sub: String,
    /// Node name.
    pub name: String,
    /// Interface name the token was issued for.
    pub iface: String,
    /// MAC address of that interface.
    pub mac: String,
    /// Unique token id.
    pub jti: String,
    /// Audience, always [`BOOT_AUDIENCE`].
    pub aud: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Issues and consumes boot tokens.
pub struct BootTokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    /// Consumed token ids and their expiry.
    used: Mutex<HashMap<String, i64>>,
}

impl BootTokenSigner {
    /// Create a signer from the shared secret in `config`.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret()),
            decoding: DecodingKey::from_secret(config.secret()),
            ttl: Duration::seconds(config.boot_token_ttl_seconds),
            used: Mutex::new(HashMap::new()),
        }
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for one node interface.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if encoding fails.
    pub fn issue(&self, uid: &str, name: &str, iface: &str, mac: &str) -> Result<String> {
        let now = Utc::now();
        let claims = BootClaims {
            sub: uid.to_string(),
            name: name.to_string(),
            iface: iface.to_string(),
            mac: mac.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            aud: BOOT_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.encode_claims(&claims)
    }

    fn encode_claims(&self, claims: &BootClaims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Validate a token and mark it used.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenReused` on a second presentation, or a
    /// signature, audience or expiry error.
    pub fn consume(&self, token: &str) -> Result<BootClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[BOOT_AUDIENCE]);
        validation.leeway = 0;

        let claims = decode::<BootClaims>(token, &self.decoding, &validation)?.claims;

        let now = Utc::now().timestamp();
        let mut used = self.used.lock();
        used.retain(|_, exp| *exp >= now);
        if used.contains_key(&claims.jti) {
            tracing::warn!(node = %claims.name, jti = %claims.jti, "Boot token presented twice");
            return Err(AuthError::TokenReused);
        }
        used.insert(claims.jti.clone(), claims.exp);
        drop(used);

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HmacValidator;

    fn config() -> AuthConfig {
        AuthConfig::with_secret(b"boot-secret-boot-secret".to_vec())
    }

    #[test]
    fn issue_then_consume_once() {
        let signer = BootTokenSigner::new(&config());
        let token = signer
            .issue("uid-1", "cpn-01", "eno1", "aa:bb:cc:00:00:01")
            .unwrap();

        let claims = signer.consume(&token).unwrap();
        assert_eq!(claims.name, "cpn-01");
        assert_eq!(claims.iface, "eno1");
        assert_eq!(claims.mac, "aa:bb:cc:00:00:01");
        assert_eq!(claims.exp - claims.iat, 900);

        assert!(matches!(signer.consume(&token), Err(AuthError::TokenReused)));
    }

    #[test]
    fn tokens_are_unique() {
        let signer = BootTokenSigner::new(&config());
        let a = signer.issue("uid-1", "cpn-01", "eno1", "m").unwrap();
        let b = signer.issue("uid-1", "cpn-01", "eno1", "m").unwrap();
        assert_ne!(a, b);
        signer.consume(&a).unwrap();
        signer.consume(&b).unwrap();
    }

    #[test]
    fn expired_token_rejected() {
        let signer = BootTokenSigner::new(&config());
        let now = Utc::now().timestamp();
        let token = signer
            .encode_claims(&BootClaims {
                sub: "uid-1".to_string(),
                name: "cpn-01".to_string(),
                iface: "eno1".to_string(),
                mac: "m".to_string(),
                jti: "old".to_string(),
                aud: BOOT_AUDIENCE.to_string(),
                iat: now - 1000,
                exp: now - 100,
            })
            .unwrap();
        assert!(matches!(signer.consume(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn session_token_is_not_a_boot_token() {
        let config = config();
        let session = HmacValidator::new(&config)
            .issue("alice", "admin", None)
            .unwrap();
        let signer = BootTokenSigner::new(&config);
        assert!(signer.consume(&session.token).is_err());
    }
}

//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The JWT has expired.
    #[error("token expired")]
    TokenExpired,

    /// The JWT signature is invalid.
    #[error("invalid signature")]
    InvalidSignature,

    /// The JWT was issued for a different purpose.
    #[error("invalid audience")]
    InvalidAudience,

    /// The session token was revoked by a signout.
    #[error("token revoked")]
    TokenRevoked,

    /// The single-use token was already presented once.
    #[error("token already used")]
    TokenReused,

    /// The token format is invalid.
    #[error("invalid token format: {0}")]
    InvalidToken(String),

    /// Username or password is wrong.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The caller's role does not grant the request.
    #[error("permission denied")]
    PermissionDenied,

    /// The signing secret is not usable.
    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if this error indicates the client should retry with a new token.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::TokenExpired | Self::TokenRevoked)
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::TokenExpired
            | Self::InvalidSignature
            | Self::InvalidAudience
            | Self::TokenRevoked
            | Self::TokenReused
            | Self::InvalidToken(_)
            | Self::InvalidCredentials => 401,
            Self::PermissionDenied => 403,
            Self::InvalidSecret(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            _ => Self::InvalidToken(err.to_string()),
        }
    }
}

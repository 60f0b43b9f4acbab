//! Error types for the control plane.
//!
//! Per-node BMC failures never surface here; they are reported inside a
//! [`BatchReport`](crate::BatchReport). These errors abort a whole request.

use grendel_core::CoreError;
use grendel_store::StoreError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The request is malformed: bad selector syntax, missing fields, bad values.
    #[error("validation error: {0}")]
    Validation(String),

    /// A named record does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Record kind, e.g. `image`.
        kind: &'static str,
        /// Record name.
        name: String,
    },

    /// The selector resolved to no node for an operation that needs at least one.
    #[error("no nodes matched the selector")]
    EmptyNodeSet,

    /// The request conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(#[from] grendel_auth::AuthError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Shorthand for [`ControlError::NotFound`].
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } | Self::EmptyNodeSet => 404,
            Self::Conflict(_) => 409,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Auth(err) => err.http_status_code(),
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Internal(_))
    }
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidQuery(core) => core.into(),
            StoreError::InvalidKey(reason) => Self::Validation(reason),
            other => Self::Store(other),
        }
    }
}

impl From<CoreError> for ControlError {
    fn from(err: CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(ControlError::Validation("x".into()).http_status_code(), 400);
        assert_eq!(ControlError::not_found("image", "rocky").http_status_code(), 404);
        assert_eq!(ControlError::EmptyNodeSet.http_status_code(), 404);
        assert_eq!(ControlError::Conflict("x".into()).http_status_code(), 409);
        assert_eq!(ControlError::Unauthorized("x".into()).http_status_code(), 401);
        assert_eq!(ControlError::Forbidden("x".into()).http_status_code(), 403);
        assert_eq!(
            ControlError::Auth(grendel_auth::AuthError::PermissionDenied).http_status_code(),
            403
        );
        assert_eq!(ControlError::Internal("x".into()).http_status_code(), 500);
    }

    #[test]
    fn invalid_query_is_a_validation_error() {
        let err: ControlError = StoreError::InvalidKey("tag contains NUL".into()).into();
        assert!(matches!(err, ControlError::Validation(_)));
        assert!(!err.is_retriable());
    }
}

//! BMC error types.

use thiserror::Error;

use crate::client::Capability;

/// A result type using `BmcError`.
pub type Result<T> = std::result::Result<T, BmcError>;

/// Errors returned by a BMC adapter.
#[derive(Debug, Clone, Error)]
pub enum BmcError {
    /// The adapter does not implement the capability.
    #[error("capability not supported: {0}")]
    Unsupported(Capability),

    /// The BMC could not be reached.
    #[error("BMC unreachable: {0}")]
    Unreachable(String),

    /// The request did not complete in time.
    #[error("BMC request timed out")]
    Timeout,

    /// The BMC answered with a non-success status.
    #[error("BMC returned HTTP {status}")]
    Vendor {
        /// HTTP status code.
        status: u16,
        /// Raw response body, or `null` when it was not JSON.
        payload: serde_json::Value,
    },

    /// The BMC answered with a body that could not be interpreted.
    #[error("invalid BMC response: {0}")]
    InvalidResponse(String),

    /// The adapter could not be configured.
    #[error("BMC client configuration error: {0}")]
    Config(String),
}

impl BmcError {
    /// Returns `true` if repeating the same call may succeed.
    ///
    /// Transport failures, timeouts, throttling and server-side errors other
    /// than `501 Not Implemented` are retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout => true,
            Self::Vendor { status, .. } => {
                *status == 429 || (*status >= 500 && *status != 501)
            }
            Self::Unsupported(_) | Self::InvalidResponse(_) | Self::Config(_) => false,
        }
    }

    /// The vendor payload, if this is a vendor error.
    #[must_use]
    pub const fn vendor_payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Vendor { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BmcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_classification() {
        assert!(BmcError::Timeout.is_retriable());
        assert!(BmcError::Unreachable("refused".into()).is_retriable());
        assert!(BmcError::Vendor {
            status: 503,
            payload: serde_json::Value::Null
        }
        .is_retriable());
        assert!(!BmcError::Vendor {
            status: 501,
            payload: serde_json::Value::Null
        }
        .is_retriable());
        assert!(!BmcError::Vendor {
            status: 400,
            payload: serde_json::Value::Null
        }
        .is_retriable());
        assert!(!BmcError::Unsupported(Capability::SelClear).is_retriable());
    }
}

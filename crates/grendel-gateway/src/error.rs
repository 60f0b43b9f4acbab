//! API error types and responses.
//!
//! Every non-2xx response carries a problem-details body:
//!
//! ```json
//! {"type": "about:blank", "title": "Not Found", "detail": "image not found: rocky9",
//!  "status": 404, "instance": "/v1/nodes/image", "errors": []}
//! ```
//!
//! [`ApiError`] renders the body without knowing the request path; the
//! [`problem_details`] middleware fills in `instance` and wraps plain-text
//! rejections produced by axum extractors.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use grendel_control::{ControlError, ItemFailure};

/// Media type of problem-details bodies.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// Largest rejection body rewrapped by [`problem_details`].
const MAX_REJECTION_BYTES: usize = 64 * 1024;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid authentication token.
    #[error("{0}")]
    Unauthorized(String),

    /// The caller's role does not allow the request.
    #[error("{0}")]
    Forbidden(String),

    /// The requested resource was not found.
    #[error("{0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("{0}")]
    Conflict(String),

    /// Invalid request body or parameters.
    #[error("{0}")]
    BadRequest(String),

    /// Every item of a bulk request was rejected.
    #[error("{detail}")]
    Rejected {
        /// Summary.
        detail: String,
        /// Per-item reasons.
        errors: Vec<ItemFailure>,
    },

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

/// Problem-details body.
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    /// Always `about:blank`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Status reason phrase.
    pub title: String,
    /// What went wrong.
    pub detail: String,
    /// HTTP status code.
    pub status: u16,
    /// Request path.
    pub instance: String,
    /// Per-item failures of bulk requests.
    pub errors: Vec<ItemFailure>,
}

impl Problem {
    /// Build a problem for `status`.
    #[must_use]
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            kind: "about:blank",
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            detail: detail.into(),
            status: status.as_u16(),
            instance: String::new(),
            errors: Vec::new(),
        }
    }

    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_vec(&self).unwrap_or_default();
        let mut response = (status, body).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
        response.extensions_mut().insert(self);
        response
    }
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) | Self::Rejected { .. } => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut problem = Problem::new(self.status_code(), self.to_string());
        if let Self::Rejected { errors, .. } = self {
            problem.errors = errors;
        }
        problem.into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err.http_status_code() {
            400 => Self::BadRequest(err.to_string()),
            401 => Self::Unauthorized(err.to_string()),
            403 => Self::Forbidden(err.to_string()),
            404 => Self::NotFound(err.to_string()),
            409 => Self::Conflict(err.to_string()),
            _ => {
                tracing::error!(error = %err, "Request failed");
                Self::Internal(match err {
                    ControlError::Store(_) => "storage error".to_string(),
                    other => other.to_string(),
                })
            }
        }
    }
}

/// Middleware that completes problem-details bodies.
///
/// Sets `instance` to the request path on bodies rendered by [`ApiError`],
/// and turns any other non-2xx response without a JSON body into a
/// problem whose `detail` is the original body text.
pub async fn problem_details(request: Request, next: Next) -> Response {
    let instance = request.uri().path().to_string();
    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    if let Some(problem) = response.extensions().get::<Problem>() {
        let mut problem = problem.clone();
        problem.instance = instance;
        let (mut parts, _) = response.into_parts();
        let body = serde_json::to_vec(&problem).unwrap_or_default();
        parts.headers.remove(header::CONTENT_LENGTH);
        return Response::from_parts(parts, Body::from(body));
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("json"));
    if is_json {
        return response;
    }

    let (parts, body) = response.into_parts();
    let detail = to_bytes(body, MAX_REJECTION_BYTES)
        .await
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default();
    let mut problem = Problem::new(parts.status, detail);
    problem.instance = instance;
    let mut response = problem.into_response();
    for (name, value) in &parts.headers {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }
    response
}

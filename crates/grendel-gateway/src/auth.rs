//! Authentication and authorization extractors.
//!
//! [`AuthUser`] validates the `Authorization: Bearer <token>` header and then
//! asks the control plane whether the caller's current role may perform the
//! request's method on its path. Handlers that take an `AuthUser` are
//! therefore both authenticated and authorized.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::header;

use grendel_auth::{JwtValidator, ValidatedClaims};
use grendel_control::{AuthContext, ControlPlane};

use crate::error::ApiError;
use crate::state::GatewayState;

/// An authenticated and authorized caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Identity passed to control plane operations, with the current role.
    pub ctx: AuthContext,
    /// The validated token, used to revoke it on sign-out.
    pub claims: ValidatedClaims,
}

/// Extract the bearer token from request headers.
fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".to_string()))
}

#[async_trait]
impl<C, V> FromRequestParts<Arc<GatewayState<C, V>>> for AuthUser
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState<C, V>>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state
            .jwt_validator
            .validate(token)
            .await
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

        let ctx = state
            .control
            .authorize(
                &AuthContext::from(&claims),
                parts.method.as_str(),
                parts.uri.path(),
            )
            .await?;

        Ok(Self { ctx, claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/v1/nodes");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc.def"))).unwrap(), "abc.def");
        assert_eq!(bearer_token(&parts(Some("bearer abc"))).unwrap(), "abc");
        assert!(bearer_token(&parts(None)).is_err());
        assert!(bearer_token(&parts(Some("Basic dXNlcjpwdw=="))).is_err());
        assert!(bearer_token(&parts(Some("Bearer "))).is_err());
    }
}

//! Sign-in, sign-up, sign-out, password reset and API tokens.
//!
//! `signin` and `signup` are the only `/v1` routes reachable without a
//! bearer token.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use grendel_auth::JwtValidator;
use grendel_control::{ControlPlane, MutationResult};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Username and password.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

/// Body of `POST /v1/auth/token`.
#[derive(Debug, Deserialize)]
pub struct TokenBody {
    /// Name recorded in the token; need not be an existing account.
    pub username: String,
    /// Role granted by the token.
    pub role: String,
    /// Lifetime: seconds, a `s`/`m`/`h`/`d` suffix, or `infinite`.
    #[serde(default = "TokenBody::default_expire")]
    pub expire: String,
}

impl TokenBody {
    fn default_expire() -> String {
        "infinite".to_string()
    }
}

/// Exchange credentials for a session token.
///
/// # Errors
///
/// Returns `Unauthorized` for an unknown user or a wrong password.
pub async fn signin<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let token = state.control.signin(&body.username, &body.password).await?;
    tracing::info!(username = %token.username, "User signed in");
    Ok(Json(token))
}

/// Create an account and return a session token for it.
///
/// # Errors
///
/// Returns `Conflict` if the username is taken and `BadRequest` for an
/// invalid name or a short password.
pub async fn signup<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let token = state.control.signup(&body.username, &body.password).await?;
    Ok((StatusCode::CREATED, Json(token)))
}

/// Revoke the presented token.
///
/// # Errors
///
/// Returns `Unauthorized` if the token is already invalid.
pub async fn signout<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    state.jwt_validator.revoke(&user.claims);
    tracing::info!(username = %user.ctx.username, "User signed out");
    Ok(Json(MutationResult::new(
        "signed out",
        format!("token of {} revoked", user.ctx.username),
        1,
    )))
}

/// Change a password; users may change their own, admins anyone's.
///
/// # Errors
///
/// Returns `Forbidden` when changing someone else's password without the
/// admin role, and `NotFound` for an unknown user.
pub async fn reset_password<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let result = state
        .control
        .reset_password(&user.ctx, &body.username, &body.password)
        .await?;
    Ok(Json(result))
}

/// Issue an API token.
///
/// # Errors
///
/// Returns `NotFound` if the role does not exist and `BadRequest` for an
/// unparseable `expire`.
pub async fn issue_token<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Json(body): Json<TokenBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let token = state
        .control
        .issue_api_token(&user.ctx, &body.username, &body.role, &body.expire)
        .await?;
    Ok((StatusCode::CREATED, Json(token)))
}

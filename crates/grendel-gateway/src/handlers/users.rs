//! User management endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use grendel_auth::JwtValidator;
use grendel_control::ControlPlane;

use super::split_names;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Body of `PATCH /v1/users/:names/role`.
#[derive(Debug, Deserialize)]
pub struct RoleBody {
    /// Role to assign.
    pub role: String,
}

/// List users without their password hashes.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_users<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    Ok(Json(state.control.list_users(&user.ctx).await?))
}

/// Assign a role to the comma-separated users in the path.
///
/// # Errors
///
/// Returns `NotFound` for an unknown role and `Conflict` if the change
/// would leave no admin.
pub async fn set_role<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(names): Path<String>,
    Json(body): Json<RoleBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let names = split_names(&names);
    let result = state
        .control
        .set_user_role(&user.ctx, &names, &body.role)
        .await?;
    Ok(Json(result))
}

/// Delete the comma-separated users in the path.
///
/// # Errors
///
/// Returns `Conflict` if the deletion would leave no admin.
pub async fn delete_users<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(names): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let names = split_names(&names);
    Ok(Json(state.control.delete_users(&user.ctx, &names).await?))
}

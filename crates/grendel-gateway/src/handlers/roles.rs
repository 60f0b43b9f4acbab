//! Role management endpoints.
//!
//! The built-in `admin`, `user` and `disabled` roles are read-only.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use grendel_auth::JwtValidator;
use grendel_control::ControlPlane;
use grendel_store::Permission;

use super::split_names;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Body of `POST /v1/roles`.
#[derive(Debug, Deserialize)]
pub struct AddRoleBody {
    /// New role name.
    pub role: String,
    /// Role whose permissions are copied.
    #[serde(default)]
    pub inherited_role: Option<String>,
}

/// Body of `PATCH /v1/roles`.
#[derive(Debug, Deserialize)]
pub struct EditRoleBody {
    /// Role to edit.
    pub role: String,
    /// Replacement permission list.
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// List roles with their permissions.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_roles<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    Ok(Json(state.control.list_roles(&user.ctx).await?))
}

/// Create a role, optionally copying another role's permissions.
///
/// # Errors
///
/// Returns `Conflict` if the role exists and `NotFound` if the inherited
/// role does not.
pub async fn add_role<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Json(body): Json<AddRoleBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let inherited = body.inherited_role.as_deref().filter(|r| !r.is_empty());
    let result = state
        .control
        .add_role(&user.ctx, &body.role, inherited)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Replace the permissions of a role.
///
/// # Errors
///
/// Returns `Conflict` for built-in roles and `BadRequest` for malformed
/// permissions.
pub async fn edit_role<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Json(body): Json<EditRoleBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let result = state
        .control
        .edit_role(&user.ctx, &body.role, body.permissions)
        .await?;
    Ok(Json(result))
}

/// Delete the comma-separated roles in the path.
///
/// # Errors
///
/// Returns `Conflict` if a role is built in or still assigned; nothing is
/// deleted in that case.
pub async fn delete_roles<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(names): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let names = split_names(&names);
    Ok(Json(state.control.delete_roles(&user.ctx, &names).await?))
}

//! Node inventory endpoints.
//!
//! Node-scoped routes take the selector from the `nodeset` and `tags` query
//! parameters; when both are given the matches are intersected.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use grendel_auth::JwtValidator;
use grendel_control::{ControlPlane, NodeSelector, TagAction};
use grendel_store::Node;

use super::UpsertResponse;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Body of `PATCH /v1/nodes/image`.
#[derive(Debug, Deserialize)]
pub struct ImageBody {
    /// Boot image name.
    pub image: String,
}

/// Body of `PATCH /v1/nodes/provision`.
#[derive(Debug, Deserialize)]
pub struct ProvisionBody {
    /// New provision flag.
    pub provision: bool,
}

/// Body of `PATCH /v1/nodes/tags/:action`.
#[derive(Debug, Deserialize)]
pub struct TagsBody {
    /// Tags to add or remove.
    pub tags: Vec<String>,
}

/// List every node.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_nodes<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let nodes = state.control.list_nodes(&user.ctx).await?;
    Ok(Json(nodes))
}

/// Nodes matching the selector.
///
/// # Errors
///
/// Returns `BadRequest` for a missing or malformed selector.
pub async fn find_nodes<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let nodes = state.control.find_nodes(&user.ctx, &selector).await?;
    Ok(Json(nodes))
}

/// Insert or replace nodes.
///
/// Items are validated one by one; rejected items are listed in `errors`.
///
/// # Errors
///
/// Returns `Rejected` if every submitted node was rejected.
pub async fn upsert_nodes<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Json(nodes): Json<Vec<Node>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let report = state.control.upsert_nodes(&user.ctx, nodes).await?;
    Ok(Json(UpsertResponse::from_report("nodes", report)?))
}

/// Delete the selected nodes.
///
/// # Errors
///
/// Returns `BadRequest` for a missing or malformed selector.
pub async fn delete_nodes<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let result = state.control.delete_nodes(&user.ctx, &selector).await?;
    Ok(Json(result))
}

/// Assign a boot image to the selected nodes.
///
/// # Errors
///
/// Returns `NotFound` if the image does not exist.
pub async fn set_image<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
    Json(body): Json<ImageBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let result = state
        .control
        .set_boot_image(&user.ctx, &selector, &body.image)
        .await?;
    Ok(Json(result))
}

/// Set or clear the provision flag of the selected nodes.
///
/// # Errors
///
/// Returns `BadRequest` for a missing or malformed selector.
pub async fn set_provision<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
    Json(body): Json<ProvisionBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let result = state
        .control
        .set_provision(&user.ctx, &selector, body.provision)
        .await?;
    Ok(Json(result))
}

/// Add or remove tags on the selected nodes.
///
/// # Errors
///
/// Returns `BadRequest` if `action` is neither `add` nor `remove`.
pub async fn apply_tags<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(action): Path<String>,
    Query(selector): Query<NodeSelector>,
    Json(body): Json<TagsBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let action = TagAction::from_str(&action)?;
    let result = state
        .control
        .apply_tags(&user.ctx, &selector, action, &body.tags)
        .await?;
    Ok(Json(result))
}

/// Issue boot tokens for an interface of the selected nodes.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn boot_tokens<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Path(interface): Path<String>,
    Query(selector): Query<NodeSelector>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let tokens = state
        .control
        .issue_boot_tokens(&user.ctx, &selector, &interface)
        .await?;
    Ok(Json(tokens))
}

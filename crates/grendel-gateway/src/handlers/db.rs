//! Database dump and restore.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use grendel_auth::JwtValidator;
use grendel_control::ControlPlane;
use grendel_store::DataDump;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Export hosts, images and users.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn dump<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    Ok(Json(state.control.dump(&user.ctx).await?))
}

/// Replace hosts, images and users with an uploaded dump.
///
/// Waits for running batches to release the inventory first.
///
/// # Errors
///
/// Returns `BadRequest` if a record in the dump is invalid.
pub async fn restore<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Json(dump): Json<DataDump>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    tracing::warn!(
        username = %user.ctx.username,
        hosts = dump.hosts.len(),
        images = dump.images.len(),
        users = dump.users.len(),
        "Restoring database"
    );
    Ok(Json(state.control.restore(&user.ctx, dump).await?))
}

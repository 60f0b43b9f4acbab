//! Boot image endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;

use grendel_auth::JwtValidator;
use grendel_control::ControlPlane;
use grendel_store::BootImage;

use super::{NamesQuery, UpsertResponse};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// List every boot image.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_images<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    Ok(Json(state.control.list_images(&user.ctx).await?))
}

/// Boot images named in `?names=`.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn find_images<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(query): Query<NamesQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let names = query.names();
    if names.is_empty() {
        return Err(ApiError::BadRequest("names must not be empty".to_string()));
    }
    Ok(Json(state.control.find_images(&user.ctx, &names).await?))
}

/// Insert or merge boot images.
///
/// # Errors
///
/// Returns `Rejected` if every submitted image was rejected.
pub async fn upsert_images<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Json(images): Json<Vec<BootImage>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let report = state.control.upsert_images(&user.ctx, images).await?;
    Ok(Json(UpsertResponse::from_report("images", report)?))
}

/// Delete the boot images named in `?names=`.
///
/// # Errors
///
/// Returns `BadRequest` if no name is given.
pub async fn delete_images<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(query): Query<NamesQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let names = query.names();
    if names.is_empty() {
        return Err(ApiError::BadRequest("names must not be empty".to_string()));
    }
    Ok(Json(state.control.delete_images(&user.ctx, &names).await?))
}

//! Network boot endpoint.
//!
//! Firmware fetches `GET /boot/:token/ipxe` with a single-use token issued
//! through `GET /v1/nodes/token/:interface`; no bearer token is involved.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use grendel_auth::JwtValidator;
use grendel_control::ControlPlane;

use crate::error::ApiError;
use crate::state::GatewayState;

/// Consume a boot token and answer with the node's iPXE script.
///
/// # Errors
///
/// Returns `Unauthorized` for an invalid, expired, reused or stale token and
/// `NotFound` if the node or its image is gone.
pub async fn ipxe<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let script = state.control.ipxe_script(&token).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], script))
}

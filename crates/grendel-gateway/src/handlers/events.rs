//! Audit log endpoint.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use grendel_auth::JwtValidator;
use grendel_control::ControlPlane;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Query parameters for event retrieval.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Number of events to return (default: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    100
}

/// The newest events first.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_events<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    Ok(Json(state.control.list_events(&user.ctx, query.limit).await?))
}

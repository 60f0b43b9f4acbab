//! BMC fan-out endpoints.
//!
//! Every route resolves the `nodeset`/`tags` selector and runs one
//! [`Operation`] on all matching nodes. Read operations answer with one
//! `{name, status, msg, data}` entry per node; mutating operations answer
//! with the per-node job messages that were also written to the event log.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use grendel_auth::JwtValidator;
use grendel_bmc::{BootOverride, FirmwareRepo, PowerAction, ShutdownType, CLEAR_ALL_JOBS};
use grendel_control::{ControlPlane, NodeSelector, Operation};

use super::split_names;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// `?jids=` of `DELETE /v1/bmc/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobsQuery {
    /// Comma-separated job ids; empty clears every job.
    #[serde(default)]
    pub jids: Option<String>,
}

/// Body of `POST /v1/bmc/power/os`.
#[derive(Debug, Deserialize)]
pub struct PowerOsBody {
    /// Reset type.
    pub power_option: PowerAction,
    /// One-time boot target set before the reset.
    #[serde(default)]
    pub boot_option: Option<BootOverride>,
}

/// Body of `POST /v1/bmc/configure/import`.
#[derive(Debug, Deserialize)]
pub struct ImportBody {
    /// Template file name.
    pub file: String,
    /// How the host is shut down to apply the configuration.
    #[serde(default)]
    pub shutdown_type: ShutdownType,
}

/// Catalog location as query parameters; falls back to the Dell catalog.
#[derive(Debug, Default, Deserialize)]
pub struct RepoQuery {
    /// Share host.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Share protocol.
    #[serde(default)]
    pub share_type: Option<String>,
    /// Share path.
    #[serde(default)]
    pub share_name: Option<String>,
    /// Catalog file.
    #[serde(default)]
    pub catalog_file: Option<String>,
}

impl RepoQuery {
    fn into_repo(self) -> FirmwareRepo {
        let Some(ip_address) = self.ip_address.filter(|ip| !ip.is_empty()) else {
            return FirmwareRepo::dell_default();
        };
        let default = FirmwareRepo::dell_default();
        FirmwareRepo {
            ip_address,
            share_type: self.share_type.unwrap_or(default.share_type),
            share_name: self.share_name.unwrap_or_default(),
            catalog_file: self.catalog_file.or(default.catalog_file),
        }
    }
}

/// Body of `POST /v1/bmc/upgrade/dell/installfromrepo`.
#[derive(Debug, Deserialize)]
pub struct InstallBody {
    /// Reboot to apply the updates.
    #[serde(default)]
    pub reboot: bool,
    /// Catalog repository; defaults to the Dell catalog.
    #[serde(default)]
    pub repo: Option<FirmwareRepo>,
}

async fn run<C, V>(
    state: &GatewayState<C, V>,
    user: &AuthUser,
    selector: &NodeSelector,
    operation: Operation,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let mutating = operation.is_mutating();
    let report = state.control.execute(&user.ctx, selector, operation).await?;
    tracing::debug!(summary = %report.summary(), "BMC batch finished");

    Ok(if mutating {
        Json(report.job_messages()).into_response()
    } else {
        Json(report.node_data()).into_response()
    })
}

/// System summary of every selected node.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn system_info<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    run(&state, &user, &selector, Operation::SystemInfo).await
}

/// BMC job queues.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn list_jobs<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    run(&state, &user, &selector, Operation::ListJobs).await
}

/// Delete BMC jobs; without `jids` the whole queue is cleared.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn delete_jobs<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
    Query(jobs): Query<JobsQuery>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let mut ids = jobs.jids.as_deref().map(split_names).unwrap_or_default();
    if ids.is_empty() {
        ids.push(CLEAR_ALL_JOBS.to_string());
    }
    run(&state, &user, &selector, Operation::DeleteJobs { ids }).await
}

/// Host power action with an optional one-time boot override.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn power_os<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
    Json(body): Json<PowerOsBody>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let operation = Operation::PowerOs {
        action: body.power_option,
        boot_override: body.boot_option,
    };
    run(&state, &user, &selector, operation).await
}

/// Restart the BMCs.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn power_bmc<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    run(&state, &user, &selector, Operation::PowerBmc).await
}

/// Clear the system event logs.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn clear_sel<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    run(&state, &user, &selector, Operation::ClearSel).await
}

/// Telemetry metric reports.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn metrics<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    run(&state, &user, &selector, Operation::Metrics).await
}

/// Render a configuration template per node and import it.
///
/// # Errors
///
/// Returns `BadRequest` for an invalid template name and `NotFound` if the
/// selector matches no node.
pub async fn import_configuration<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
    Json(body): Json<ImportBody>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let operation = Operation::ImportConfiguration {
        template: body.file,
        shutdown: body.shutdown_type,
    };
    run(&state, &user, &selector, operation).await
}

/// One-time PXE boot followed by a forced restart.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn auto_configure<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    run(&state, &user, &selector, Operation::AutoConfigure).await
}

/// Firmware updates available from a catalog repository.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn firmware_check<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
    Query(repo): Query<RepoQuery>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let operation = Operation::FirmwareCheck {
        repo: repo.into_repo(),
    };
    run(&state, &user, &selector, operation).await
}

/// Install firmware updates from a catalog repository.
///
/// # Errors
///
/// Returns `NotFound` if the selector matches no node.
pub async fn firmware_install<C, V>(
    State(state): State<Arc<GatewayState<C, V>>>,
    user: AuthUser,
    Query(selector): Query<NodeSelector>,
    Json(body): Json<InstallBody>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    V: JwtValidator + 'static,
{
    let operation = Operation::FirmwareInstall {
        repo: body.repo.unwrap_or_else(FirmwareRepo::dell_default),
        reboot: body.reboot,
    };
    run(&state, &user, &selector, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_query_defaults_to_dell() {
        assert_eq!(RepoQuery::default().into_repo(), FirmwareRepo::dell_default());

        let repo = RepoQuery {
            ip_address: Some("10.0.0.5".into()),
            share_type: Some("HTTP".into()),
            share_name: Some("catalog".into()),
            catalog_file: None,
        }
        .into_repo();
        assert_eq!(repo.ip_address, "10.0.0.5");
        assert_eq!(repo.share_type, "HTTP");
        assert_eq!(repo.share_name, "catalog");
        assert_eq!(repo.catalog_file.as_deref(), Some("Catalog.xml"));
    }

    #[test]
    fn power_body_uses_redfish_names() {
        let body: PowerOsBody =
            serde_json::from_str(r#"{"power_option":"ForceRestart","boot_option":"Pxe"}"#)
                .unwrap();
        assert_eq!(body.power_option, PowerAction::ForceRestart);
        assert_eq!(body.boot_option, Some(BootOverride::Pxe));
    }
}

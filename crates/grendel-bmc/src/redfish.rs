//! Standard DMTF Redfish adapter.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{BmcClient, Capability};
use crate::error::{BmcError, Result};
use crate::http::{RedfishHttp, SERVICE_ROOT};
use crate::types::{
    ActionAck, BootOverride, Job, MetricReport, PowerAction, SystemInfo, CLEAR_ALL_JOBS,
};

const JOBS: &str = "/redfish/v1/JobService/Jobs";
const METRIC_REPORTS: &str = "/redfish/v1/TelemetryService/MetricReports";

/// Adapter for BMCs speaking plain Redfish.
///
/// Capabilities are derived from the service root: power control and SEL
/// clearing are always present, job management and metric reports only when
/// the root links a `JobService` or `TelemetryService`.
pub struct RedfishClient {
    http: RedfishHttp,
    vendor: String,
    system_path: String,
    manager_path: String,
    capabilities: Vec<Capability>,
}

impl RedfishClient {
    /// Discover the first system and manager of a service.
    ///
    /// # Errors
    ///
    /// Returns an error if either collection cannot be read or is empty.
    pub async fn discover(http: RedfishHttp, root: &Value) -> Result<Self> {
        let vendor = root
            .get("Vendor")
            .and_then(Value::as_str)
            .unwrap_or("Redfish")
            .to_string();
        let system_path = http.first_member(&format!("{SERVICE_ROOT}/Systems")).await?;
        let manager_path = http.first_member(&format!("{SERVICE_ROOT}/Managers")).await?;

        let mut capabilities = vec![Capability::PowerControl, Capability::SelClear];
        if root.get("JobService").is_some() {
            capabilities.push(Capability::JobManagement);
        }
        if root.get("TelemetryService").is_some() {
            capabilities.push(Capability::MetricReports);
        }

        Ok(Self::with_paths(
            http,
            vendor,
            system_path,
            manager_path,
            capabilities,
        ))
    }

    /// Create an adapter with known resource paths.
    #[must_use]
    pub fn with_paths(
        http: RedfishHttp,
        vendor: impl Into<String>,
        system_path: impl Into<String>,
        manager_path: impl Into<String>,
        capabilities: Vec<Capability>,
    ) -> Self {
        Self {
            http,
            vendor: vendor.into(),
            system_path: system_path.into(),
            manager_path: manager_path.into(),
            capabilities,
        }
    }

    /// The underlying transport.
    #[must_use]
    pub const fn http(&self) -> &RedfishHttp {
        &self.http
    }

    /// Find the SEL log service, looking under the system before the manager.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::InvalidResponse` if neither resource exposes one.
    pub async fn sel_log_service(&self) -> Result<Value> {
        for owner in [&self.system_path, &self.manager_path] {
            let services = match self.http.get_members(&format!("{owner}/LogServices")).await {
                Ok(services) => services,
                Err(BmcError::Vendor { status: 404, .. }) => continue,
                Err(err) => return Err(err),
            };
            if let Some(service) = services.into_iter().find(is_sel_service) {
                return Ok(service);
            }
        }
        Err(BmcError::InvalidResponse("no SEL log service".into()))
    }

    /// Path of the managed computer system.
    #[must_use]
    pub fn system_path(&self) -> &str {
        &self.system_path
    }

    /// Path of the BMC manager resource.
    #[must_use]
    pub fn manager_path(&self) -> &str {
        &self.manager_path
    }

    /// Set a one-time boot source override.
    ///
    /// # Errors
    ///
    /// Returns a transport or vendor error.
    pub async fn set_boot_override(&self, target: BootOverride) -> Result<ActionAck> {
        let enabled = if target == BootOverride::None {
            "Disabled"
        } else {
            "Once"
        };
        let body = json!({
            "Boot": {
                "BootSourceOverrideTarget": target.as_target(),
                "BootSourceOverrideEnabled": enabled,
            }
        });
        self.http.patch(&self.system_path, &body).await
    }

    /// List job ids, expanding the `JID_CLEARALL` sentinel.
    async fn resolve_job_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.iter().any(|id| id == CLEAR_ALL_JOBS) {
            return Ok(self.list_jobs().await?.into_iter().map(|j| j.id).collect());
        }
        Ok(ids.to_vec())
    }
}

#[async_trait]
impl BmcClient for RedfishClient {
    fn vendor(&self) -> &str {
        &self.vendor
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        let system = self.http.get(&self.system_path).await?;
        Ok(SystemInfo::from_redfish(&system))
    }

    async fn power_os(
        &self,
        action: PowerAction,
        boot_override: Option<BootOverride>,
    ) -> Result<ActionAck> {
        if let Some(target) = boot_override {
            self.set_boot_override(target).await?;
        }
        let path = format!("{}/Actions/ComputerSystem.Reset", self.system_path);
        let body = json!({ "ResetType": action.as_reset_type() });
        let (ack, _) = self.http.post(&path, &body).await?;
        Ok(ack)
    }

    async fn reset_bmc(&self) -> Result<ActionAck> {
        let path = format!("{}/Actions/Manager.Reset", self.manager_path);
        let body = json!({ "ResetType": "GracefulRestart" });
        let (ack, _) = self.http.post(&path, &body).await?;
        Ok(ack)
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        if !self.supports(Capability::JobManagement) {
            return Err(BmcError::Unsupported(Capability::JobManagement));
        }
        let members = self.http.get_members(JOBS).await?;
        Ok(members.iter().map(Job::from_redfish).collect())
    }

    async fn delete_jobs(&self, ids: &[String]) -> Result<ActionAck> {
        if !self.supports(Capability::JobManagement) {
            return Err(BmcError::Unsupported(Capability::JobManagement));
        }
        let mut ack = ActionAck {
            status: 204,
            location: None,
        };
        for id in self.resolve_job_ids(ids).await? {
            ack = self.http.delete(&format!("{JOBS}/{id}")).await?;
        }
        Ok(ack)
    }

    async fn clear_sel(&self) -> Result<ActionAck> {
        let service = self.sel_log_service().await?;
        let target = service
            .pointer("/Actions/#LogService.ClearLog/target")
            .and_then(Value::as_str)
            .map(String::from);
        let target = match target {
            Some(target) => target,
            None => {
                let id = service
                    .get("@odata.id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        BmcError::InvalidResponse("SEL log service has no @odata.id".into())
                    })?;
                format!("{id}/Actions/LogService.ClearLog")
            }
        };
        let (ack, _) = self.http.post(&target, &json!({})).await?;
        Ok(ack)
    }

    async fn metric_reports(&self) -> Result<Vec<MetricReport>> {
        if !self.supports(Capability::MetricReports) {
            return Err(BmcError::Unsupported(Capability::MetricReports));
        }
        let members = self.http.get_members(METRIC_REPORTS).await?;
        Ok(members.iter().map(MetricReport::from_redfish).collect())
    }
}

fn is_sel_service(service: &Value) -> bool {
    let id_is_sel = service
        .get("Id")
        .and_then(Value::as_str)
        .is_some_and(|id| id.eq_ignore_ascii_case("sel"));
    let holds_sel = service.get("LogEntryType").and_then(Value::as_str) == Some("SEL");
    id_is_sel || holds_sel
}

//! Dell iDRAC adapter.
//!
//! Standard operations go through [`RedfishClient`]; job management,
//! configuration import and repository firmware updates use the iDRAC OEM
//! actions.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{BmcClient, Capability};
use crate::error::Result;
use crate::http::RedfishHttp;
use crate::redfish::RedfishClient;
use crate::types::{
    ActionAck, BootOverride, FirmwareRepo, Job, MetricReport, PowerAction, ShutdownType,
    SystemInfo,
};

const SYSTEM: &str = "/redfish/v1/Systems/System.Embedded.1";
const MANAGER: &str = "/redfish/v1/Managers/iDRAC.Embedded.1";
const JOBS: &str = "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs";
const DELETE_JOB_QUEUE: &str = "/redfish/v1/Dell/Managers/iDRAC.Embedded.1/DellJobService/Actions/DellJobService.DeleteJobQueue";
const IMPORT_CONFIGURATION: &str = "/redfish/v1/Managers/iDRAC.Embedded.1/Actions/Oem/EID_674_Manager.ImportSystemConfiguration";
const CLEAR_SEL: &str =
    "/redfish/v1/Managers/iDRAC.Embedded.1/LogServices/Sel/Actions/LogService.ClearLog";
const SOFTWARE_INSTALLATION: &str = "/redfish/v1/Dell/Systems/System.Embedded.1/DellSoftwareInstallationService/Actions";

/// Adapter for Dell iDRAC BMCs.
pub struct DellClient {
    inner: RedfishClient,
}

impl DellClient {
    /// Create an adapter using the fixed iDRAC resource paths.
    #[must_use]
    pub fn new(http: RedfishHttp) -> Self {
        Self {
            inner: RedfishClient::with_paths(
                http,
                "Dell",
                SYSTEM,
                MANAGER,
                Capability::ALL.to_vec(),
            ),
        }
    }

    fn http(&self) -> &RedfishHttp {
        self.inner.http()
    }

    fn repo_body(repo: &FirmwareRepo) -> Value {
        let mut body = json!({
            "IPAddress": repo.ip_address,
            "ShareType": repo.share_type,
            "ShareName": repo.share_name,
        });
        if let Some(catalog) = &repo.catalog_file {
            body["CatalogFile"] = Value::String(catalog.clone());
        }
        body
    }
}

#[async_trait]
impl BmcClient for DellClient {
    fn vendor(&self) -> &str {
        self.inner.vendor()
    }

    fn capabilities(&self) -> &[Capability] {
        self.inner.capabilities()
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        self.inner.system_info().await
    }

    async fn power_os(
        &self,
        action: PowerAction,
        boot_override: Option<BootOverride>,
    ) -> Result<ActionAck> {
        self.inner.power_os(action, boot_override).await
    }

    async fn reset_bmc(&self) -> Result<ActionAck> {
        self.inner.reset_bmc().await
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let members = self.http().get_members(JOBS).await?;
        Ok(members.iter().map(Job::from_redfish).collect())
    }

    async fn delete_jobs(&self, ids: &[String]) -> Result<ActionAck> {
        let mut ack = ActionAck {
            status: 200,
            location: None,
        };
        for id in ids {
            let (last, _) = self
                .http()
                .post(DELETE_JOB_QUEUE, &json!({ "JobID": id }))
                .await?;
            ack = last;
        }
        Ok(ack)
    }

    async fn clear_sel(&self) -> Result<ActionAck> {
        let (ack, _) = self.http().post(CLEAR_SEL, &json!({})).await?;
        Ok(ack)
    }

    async fn metric_reports(&self) -> Result<Vec<MetricReport>> {
        self.inner.metric_reports().await
    }

    async fn import_configuration(
        &self,
        shutdown: ShutdownType,
        buffer: &str,
    ) -> Result<ActionAck> {
        let body = json!({
            "ImportBuffer": buffer,
            "ShareParameters": { "Target": "ALL" },
            "ShutdownType": shutdown.as_str(),
        });
        let (ack, _) = self.http().post(IMPORT_CONFIGURATION, &body).await?;
        Ok(ack)
    }

    async fn firmware_updates(&self, repo: &FirmwareRepo) -> Result<Value> {
        let path =
            format!("{SOFTWARE_INSTALLATION}/DellSoftwareInstallationService.GetRepoBasedUpdateList");
        let (_, body) = self.http().post(&path, &Self::repo_body(repo)).await?;
        Ok(body)
    }

    async fn install_from_repo(&self, repo: &FirmwareRepo, reboot: bool) -> Result<ActionAck> {
        let path =
            format!("{SOFTWARE_INSTALLATION}/DellSoftwareInstallationService.InstallFromRepository");
        let mut body = Self::repo_body(repo);
        body["ApplyUpdate"] = Value::String("True".to_string());
        body["RebootNeeded"] = Value::Bool(reboot);
        let (ack, _) = self.http().post(&path, &body).await?;
        Ok(ack)
    }
}

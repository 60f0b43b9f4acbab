//! The capability-tagged BMC client interface.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BmcError, Result};
use crate::types::{
    ActionAck, BootOverride, FirmwareRepo, Job, MetricReport, PowerAction, ShutdownType,
    SystemInfo,
};

/// An optional feature set a BMC adapter may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Host power actions, boot overrides and BMC reset.
    PowerControl,
    /// Listing and deleting BMC jobs.
    JobManagement,
    /// Repository-based firmware catalog check and install.
    FirmwareCatalogInstall,
    /// Server configuration profile import.
    ConfigurationImport,
    /// Telemetry metric reports.
    MetricReports,
    /// Clearing the system event log.
    SelClear,
}

impl Capability {
    /// Every capability.
    pub const ALL: [Self; 6] = [
        Self::PowerControl,
        Self::JobManagement,
        Self::FirmwareCatalogInstall,
        Self::ConfigurationImport,
        Self::MetricReports,
        Self::SelClear,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerControl => "power_control",
            Self::JobManagement => "job_management",
            Self::FirmwareCatalogInstall => "firmware_catalog_install",
            Self::ConfigurationImport => "configuration_import",
            Self::MetricReports => "metric_reports",
            Self::SelClear => "sel_clear",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connection to one node's BMC.
///
/// Operations behind a capability default to `BmcError::Unsupported`;
/// adapters override the ones they implement and list them in
/// [`capabilities`](BmcClient::capabilities). Callers check
/// [`supports`](BmcClient::supports) before dispatching.
#[async_trait]
pub trait BmcClient: Send + Sync {
    /// Vendor name reported by the service root.
    fn vendor(&self) -> &str;

    /// The capabilities this adapter implements for this BMC.
    fn capabilities(&self) -> &[Capability];

    /// Returns true if the capability is implemented.
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Read the computer system summary.
    ///
    /// # Errors
    ///
    /// Returns a transport or vendor error.
    async fn system_info(&self) -> Result<SystemInfo>;

    /// Apply a host power action, optionally setting a one-time boot target first.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unsupported` unless the adapter has `PowerControl`.
    async fn power_os(
        &self,
        action: PowerAction,
        boot_override: Option<BootOverride>,
    ) -> Result<ActionAck> {
        let _ = (action, boot_override);
        Err(BmcError::Unsupported(Capability::PowerControl))
    }

    /// Restart the BMC itself.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unsupported` unless the adapter has `PowerControl`.
    async fn reset_bmc(&self) -> Result<ActionAck> {
        Err(BmcError::Unsupported(Capability::PowerControl))
    }

    /// List jobs known to the BMC.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unsupported` unless the adapter has `JobManagement`.
    async fn list_jobs(&self) -> Result<Vec<Job>> {
        Err(BmcError::Unsupported(Capability::JobManagement))
    }

    /// Delete jobs by id; [`CLEAR_ALL_JOBS`](crate::CLEAR_ALL_JOBS) clears every job.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unsupported` unless the adapter has `JobManagement`.
    async fn delete_jobs(&self, ids: &[String]) -> Result<ActionAck> {
        let _ = ids;
        Err(BmcError::Unsupported(Capability::JobManagement))
    }

    /// Clear the system event log.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unsupported` unless the adapter has `SelClear`.
    async fn clear_sel(&self) -> Result<ActionAck> {
        Err(BmcError::Unsupported(Capability::SelClear))
    }

    /// Fetch telemetry metric reports.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unsupported` unless the adapter has `MetricReports`.
    async fn metric_reports(&self) -> Result<Vec<MetricReport>> {
        Err(BmcError::Unsupported(Capability::MetricReports))
    }

    /// Import a server configuration profile.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unsupported` unless the adapter has `ConfigurationImport`.
    async fn import_configuration(
        &self,
        shutdown: ShutdownType,
        buffer: &str,
    ) -> Result<ActionAck> {
        let _ = (shutdown, buffer);
        Err(BmcError::Unsupported(Capability::ConfigurationImport))
    }

    /// List firmware updates available from a catalog repository.
    ///
    /// The vendor response is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unsupported` unless the adapter has `FirmwareCatalogInstall`.
    async fn firmware_updates(&self, repo: &FirmwareRepo) -> Result<Value> {
        let _ = repo;
        Err(BmcError::Unsupported(Capability::FirmwareCatalogInstall))
    }

    /// Install every applicable update from a catalog repository.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unsupported` unless the adapter has `FirmwareCatalogInstall`.
    async fn install_from_repo(&self, repo: &FirmwareRepo, reboot: bool) -> Result<ActionAck> {
        let _ = (repo, reboot);
        Err(BmcError::Unsupported(Capability::FirmwareCatalogInstall))
    }
}

/// Opens BMC connections.
///
/// One client is created per node per invocation and never shared across
/// nodes.
#[async_trait]
pub trait BmcConnector: Send + Sync {
    /// Connect to the BMC at `host` (FQDN, address, or base URL).
    ///
    /// # Errors
    ///
    /// Returns `BmcError::Unreachable` or a vendor error if the service root
    /// cannot be read.
    async fn connect(&self, host: &str) -> Result<Box<dyn BmcClient>>;
}

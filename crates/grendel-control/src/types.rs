//! Request and response types for control plane operations.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use grendel_auth::TokenKind;
use grendel_bmc::{BmcError, BootOverride, Capability, FirmwareRepo, PowerAction, ShutdownType};
use grendel_store::{JobMessage, JobStatus, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ControlError;

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Username, recorded as the actor of events.
    pub username: String,
    /// Role name at the time of the request.
    pub role: String,
    /// Whether the caller presented a session or an API token.
    pub kind: TokenKind,
}

impl AuthContext {
    /// Create a session context.
    #[must_use]
    pub fn new(username: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: role.into(),
            kind: TokenKind::Session,
        }
    }

    /// Set the token kind.
    #[must_use]
    pub fn with_kind(mut self, kind: TokenKind) -> Self {
        self.kind = kind;
        self
    }
}

impl From<&grendel_auth::ValidatedClaims> for AuthContext {
    fn from(claims: &grendel_auth::ValidatedClaims) -> Self {
        Self::new(claims.username.clone(), claims.role.clone()).with_kind(claims.kind)
    }
}

/// A node selector: a nodeset expression, a tag expression, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelector {
    /// Nodeset expression, e.g. `cpn-d13-[01-04]`.
    #[serde(default)]
    pub nodeset: Option<String>,
    /// Tag expression, e.g. `gpu,!retired`.
    #[serde(default)]
    pub tags: Option<String>,
}

impl NodeSelector {
    /// Select by nodeset expression.
    #[must_use]
    pub fn nodeset(expr: impl Into<String>) -> Self {
        Self {
            nodeset: Some(expr.into()),
            tags: None,
        }
    }

    /// Select by tag expression.
    #[must_use]
    pub fn tags(expr: impl Into<String>) -> Self {
        Self {
            nodeset: None,
            tags: Some(expr.into()),
        }
    }
}

/// Tuning for the orchestration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of nodes contacted at once.
    #[serde(default = "EngineConfig::default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-attempt timeout for power, job, log and read operations, in milliseconds.
    #[serde(default = "EngineConfig::default_control_timeout_ms")]
    pub control_timeout_ms: u64,
    /// Per-attempt timeout for configuration import and firmware operations, in milliseconds.
    #[serde(default = "EngineConfig::default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,
    /// Deadline for a whole batch, in milliseconds.
    #[serde(default = "EngineConfig::default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Extra attempts after a retriable failure.
    #[serde(default = "EngineConfig::default_retries")]
    pub retries: u32,
    /// First retry delay, doubled on every further retry, in milliseconds.
    #[serde(default = "EngineConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Upper bound of the retry delay, in milliseconds.
    #[serde(default = "EngineConfig::default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Directory holding configuration import templates.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
}

impl EngineConfig {
    const fn default_max_concurrency() -> usize {
        32
    }

    const fn default_control_timeout_ms() -> u64 {
        30_000
    }

    const fn default_transfer_timeout_ms() -> u64 {
        300_000
    }

    const fn default_batch_timeout_ms() -> u64 {
        900_000
    }

    const fn default_retries() -> u32 {
        2
    }

    const fn default_backoff_base_ms() -> u64 {
        500
    }

    const fn default_backoff_max_ms() -> u64 {
        8_000
    }

    /// Per-attempt timeout for an operation.
    #[must_use]
    pub const fn attempt_timeout(&self, operation: &Operation) -> Duration {
        if operation.is_transfer() {
            Duration::from_millis(self.transfer_timeout_ms)
        } else {
            Duration::from_millis(self.control_timeout_ms)
        }
    }

    /// Deadline for a whole batch.
    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(
            self.backoff_base_ms
                .saturating_mul(factor)
                .min(self.backoff_max_ms),
        )
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: Self::default_max_concurrency(),
            control_timeout_ms: Self::default_control_timeout_ms(),
            transfer_timeout_ms: Self::default_transfer_timeout_ms(),
            batch_timeout_ms: Self::default_batch_timeout_ms(),
            retries: Self::default_retries(),
            backoff_base_ms: Self::default_backoff_base_ms(),
            backoff_max_ms: Self::default_backoff_max_ms(),
            template_dir: None,
        }
    }
}

/// A BMC operation fanned out over a node set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Read the system summary.
    SystemInfo,
    /// List BMC jobs.
    ListJobs,
    /// Delete BMC jobs by id.
    DeleteJobs {
        /// Job ids; `JID_CLEARALL` clears all.
        ids: Vec<String>,
    },
    /// Host power action.
    PowerOs {
        /// Reset type.
        action: PowerAction,
        /// One-time boot target applied first.
        boot_override: Option<BootOverride>,
    },
    /// Restart the BMC.
    PowerBmc,
    /// Clear the system event log.
    ClearSel,
    /// Read telemetry reports.
    Metrics,
    /// Render a template per node and import it.
    ImportConfiguration {
        /// Template file name inside the template directory.
        template: String,
        /// Host shutdown behaviour.
        shutdown: ShutdownType,
    },
    /// One-time PXE boot followed by a forced restart.
    AutoConfigure,
    /// List firmware updates available from a repository.
    FirmwareCheck {
        /// Catalog repository.
        repo: FirmwareRepo,
    },
    /// Install firmware updates from a repository.
    FirmwareInstall {
        /// Catalog repository.
        repo: FirmwareRepo,
        /// Reboot to apply.
        reboot: bool,
    },
}

impl Operation {
    /// Stable operation name used in logs and events.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SystemInfo => "system_info",
            Self::ListJobs => "list_jobs",
            Self::DeleteJobs { .. } => "delete_jobs",
            Self::PowerOs { .. } => "power_os",
            Self::PowerBmc => "power_bmc",
            Self::ClearSel => "clear_sel",
            Self::Metrics => "metrics",
            Self::ImportConfiguration { .. } => "import_configuration",
            Self::AutoConfigure => "auto_configure",
            Self::FirmwareCheck { .. } => "firmware_check",
            Self::FirmwareInstall { .. } => "firmware_install",
        }
    }

    /// The capability a BMC must have, if any.
    #[must_use]
    pub const fn capability(&self) -> Option<Capability> {
        match self {
            Self::SystemInfo => None,
            Self::ListJobs | Self::DeleteJobs { .. } => Some(Capability::JobManagement),
            Self::PowerOs { .. } | Self::PowerBmc | Self::AutoConfigure => {
                Some(Capability::PowerControl)
            }
            Self::ClearSel => Some(Capability::SelClear),
            Self::Metrics => Some(Capability::MetricReports),
            Self::ImportConfiguration { .. } => Some(Capability::ConfigurationImport),
            Self::FirmwareCheck { .. } | Self::FirmwareInstall { .. } => {
                Some(Capability::FirmwareCatalogInstall)
            }
        }
    }

    /// Returns true if the operation changes BMC or host state.
    ///
    /// Mutating operations are recorded in the event log.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::SystemInfo | Self::ListJobs | Self::Metrics | Self::FirmwareCheck { .. }
        )
    }

    /// Returns true if the operation moves bulk data and gets the long timeout.
    #[must_use]
    pub const fn is_transfer(&self) -> bool {
        matches!(
            self,
            Self::ImportConfiguration { .. }
                | Self::FirmwareCheck { .. }
                | Self::FirmwareInstall { .. }
        )
    }
}

/// Why a node failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The node has no interface flagged as BMC, or it has no address.
    NoBmcConfigured,
    /// The BMC could not be reached.
    Unreachable(String),
    /// The BMC rejected the request.
    Vendor {
        /// HTTP status code.
        status: u16,
        /// Raw vendor payload.
        payload: Value,
    },
    /// The attempt or the batch ran out of time.
    Timeout,
    /// Anything else.
    Internal(String),
}

impl FailureReason {
    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::NoBmcConfigured => "no BMC interface configured".to_string(),
            Self::Unreachable(reason) => format!("BMC unreachable: {reason}"),
            Self::Vendor { status, .. } => format!("BMC returned HTTP {status}"),
            Self::Timeout => "timed out".to_string(),
            Self::Internal(reason) => reason.clone(),
        }
    }
}

impl From<BmcError> for FailureReason {
    fn from(err: BmcError) -> Self {
        match err {
            BmcError::Unreachable(reason) => Self::Unreachable(reason),
            BmcError::Timeout => Self::Timeout,
            BmcError::Vendor { status, payload } => Self::Vendor { status, payload },
            other => Self::Internal(other.to_string()),
        }
    }
}

/// The terminal outcome of one node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// The operation completed; read operations carry their data.
    Succeeded {
        /// Operation output.
        data: Option<Value>,
    },
    /// The operation failed.
    Failed(FailureReason),
    /// The BMC lacks the capability.
    Skipped(Capability),
}

/// The result of one node in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResult {
    /// Node name.
    pub name: String,
    /// Terminal outcome.
    pub outcome: NodeOutcome,
    /// Dispatch attempts made.
    pub attempts: u32,
}

impl NodeResult {
    /// The job status of this outcome.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        match self.outcome {
            NodeOutcome::Succeeded { .. } => JobStatus::Success,
            NodeOutcome::Failed(_) => JobStatus::Error,
            NodeOutcome::Skipped(_) => JobStatus::Skipped,
        }
    }

    /// Human-readable outcome.
    #[must_use]
    pub fn message(&self, operation: &str) -> String {
        match &self.outcome {
            NodeOutcome::Succeeded { .. } => format!("{operation} succeeded"),
            NodeOutcome::Failed(reason) => format!("{operation} failed: {}", reason.message()),
            NodeOutcome::Skipped(capability) => {
                format!("{operation} skipped: BMC does not support {capability}")
            }
        }
    }

    /// The operation output, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        match &self.outcome {
            NodeOutcome::Succeeded { data } => data.as_ref(),
            _ => None,
        }
    }

    /// Convert to the persisted per-node record.
    #[must_use]
    pub fn to_job_message(&self, operation: &str) -> JobMessage {
        let redfish_error = match &self.outcome {
            NodeOutcome::Failed(FailureReason::Vendor { payload, .. }) => Some(payload.clone()),
            _ => None,
        };
        JobMessage {
            status: self.status(),
            host: self.name.clone(),
            msg: self.message(operation),
            redfish_error,
            attempts: self.attempts,
        }
    }
}

/// One entry of a read operation's response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeData {
    /// Node name.
    pub name: String,
    /// Outcome status.
    pub status: JobStatus,
    /// Human-readable outcome.
    pub msg: String,
    /// Operation output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The results of a fan-out operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Operation name.
    pub operation: &'static str,
    /// One result per resolved node, in resolved order.
    pub results: Vec<NodeResult>,
    /// Id of the recorded event, for mutating operations.
    pub event_id: Option<u64>,
}

impl BatchReport {
    /// Event severity: `error` if any node failed, `warning` if some were
    /// skipped, `success` otherwise.
    #[must_use]
    pub fn severity(&self) -> Severity {
        let any = |status| self.results.iter().any(|r| r.status() == status);
        if any(JobStatus::Error) {
            Severity::Error
        } else if any(JobStatus::Skipped) {
            Severity::Warning
        } else {
            Severity::Success
        }
    }

    /// Number of results with the given status.
    #[must_use]
    pub fn count(&self, status: JobStatus) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} on {} node(s): {} succeeded, {} failed, {} skipped",
            self.operation,
            self.results.len(),
            self.count(JobStatus::Success),
            self.count(JobStatus::Error),
            self.count(JobStatus::Skipped)
        )
    }

    /// Per-node records, as stored in the event log.
    #[must_use]
    pub fn job_messages(&self) -> Vec<JobMessage> {
        self.results
            .iter()
            .map(|r| r.to_job_message(self.operation))
            .collect()
    }

    /// Per-node data entries for read operations.
    #[must_use]
    pub fn node_data(&self) -> Vec<NodeData> {
        self.results
            .iter()
            .map(|r| NodeData {
                name: r.name.clone(),
                status: r.status(),
                msg: r.message(self.operation),
                data: r.data().cloned(),
            })
            .collect()
    }
}

/// Outcome of an inventory mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    /// Short title.
    pub title: String,
    /// Longer description.
    pub detail: String,
    /// Number of records whose stored value changed.
    pub changed: usize,
}

impl MutationResult {
    /// Create a result.
    #[must_use]
    pub fn new(title: impl Into<String>, detail: impl Into<String>, changed: usize) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            changed,
        }
    }
}

/// A rejected item of a bulk upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Name of the rejected record.
    pub name: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Outcome of a bulk upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    /// Number of records stored with a changed value.
    pub changed: usize,
    /// Number of records accepted, changed or not.
    pub accepted: usize,
    /// Rejected items.
    pub failures: Vec<ItemFailure>,
}

impl UpsertReport {
    /// Returns true if items were submitted and none was accepted.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.accepted == 0 && !self.failures.is_empty()
    }
}

/// Whether tags are added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagAction {
    /// Add tags.
    Add,
    /// Remove tags.
    Remove,
}

impl FromStr for TagAction {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "remove" => Ok(Self::Remove),
            other => Err(ControlError::Validation(format!(
                "unknown tag action {other:?}, expected add or remove"
            ))),
        }
    }
}

/// A boot token issued for one node, or why none was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootTokenResult {
    /// Node name.
    pub name: String,
    /// The token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Why no token was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A session token handed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer token.
    pub token: String,
    /// Owner.
    pub username: String,
    /// Role the token was issued with.
    pub role: String,
    /// Expiry.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// A user as exposed over the API, without the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    /// Username.
    pub username: String,
    /// Role name.
    pub role: String,
    /// Creation timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last modification timestamp.
    pub modified_at: chrono::DateTime<chrono::Utc>,
}

impl From<grendel_store::User> for UserView {
    fn from(user: grendel_store::User) -> Self {
        Self {
            username: user.username,
            role: user.role,
            created_at: user.created_at,
            modified_at: user.modified_at,
        }
    }
}

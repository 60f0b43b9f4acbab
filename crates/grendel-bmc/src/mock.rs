//! In-memory BMC doubles for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::client::{BmcClient, BmcConnector, Capability};
use crate::error::{BmcError, Result};
use crate::types::{
    ActionAck, BootOverride, FirmwareRepo, Job, MetricReport, PowerAction, ShutdownType,
    SystemInfo,
};

/// How a mocked BMC behaves.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Implemented capabilities.
    pub capabilities: Vec<Capability>,
    /// Delay before every operation completes.
    pub latency: Duration,
    /// Fail the connection itself.
    pub unreachable: bool,
    /// Number of leading calls that fail with a retriable error.
    pub transient_failures: u32,
    /// Permanent vendor error returned by every call.
    pub vendor_error: Option<(u16, Value)>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            capabilities: Capability::ALL.to_vec(),
            latency: Duration::ZERO,
            unreachable: false,
            transient_failures: 0,
            vendor_error: None,
        }
    }
}

impl MockBehavior {
    /// Restrict the capability set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    /// Delay every operation.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Refuse connections.
    #[must_use]
    pub const fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Fail the first `count` calls with a retriable error.
    #[must_use]
    pub const fn with_transient_failures(mut self, count: u32) -> Self {
        self.transient_failures = count;
        self
    }

    /// Fail every call with a vendor error.
    #[must_use]
    pub fn with_vendor_error(mut self, status: u16, payload: Value) -> Self {
        self.vendor_error = Some((status, payload));
        self
    }
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Host the call was made against.
    pub host: String,
    /// Operation name.
    pub operation: &'static str,
}

/// Connector handing out [`MockBmc`] clients.
#[derive(Default)]
pub struct MockConnector {
    default: MockBehavior,
    hosts: HashMap<String, MockBehavior>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    connects: Arc<AtomicUsize>,
}

impl MockConnector {
    /// Create a connector where every host supports everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the behaviour of hosts without an explicit entry.
    #[must_use]
    pub fn with_default(mut self, behavior: MockBehavior) -> Self {
        self.default = behavior;
        self
    }

    /// Set the behaviour of one host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, behavior: MockBehavior) -> Self {
        self.hosts.insert(host.into(), behavior);
        self
    }

    /// Every operation recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Number of operations made against `host`.
    #[must_use]
    pub fn calls_for(&self, host: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.host == host).count()
    }

    /// Number of successful connections.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BmcConnector for MockConnector {
    async fn connect(&self, host: &str) -> Result<Box<dyn BmcClient>> {
        let behavior = self.hosts.get(host).unwrap_or(&self.default).clone();
        if behavior.unreachable {
            return Err(BmcError::Unreachable(format!("{host}: connection refused")));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockBmc {
            host: host.to_string(),
            behavior,
            attempts: AtomicU32::new(0),
            calls: Arc::clone(&self.calls),
        }))
    }
}

/// A scripted BMC.
pub struct MockBmc {
    host: String,
    behavior: MockBehavior,
    attempts: AtomicU32,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockBmc {
    async fn run(&self, operation: &'static str, capability: Option<Capability>) -> Result<()> {
        self.calls.lock().push(MockCall {
            host: self.host.clone(),
            operation,
        });

        if let Some(capability) = capability {
            if !self.supports(capability) {
                return Err(BmcError::Unsupported(capability));
            }
        }

        if !self.behavior.latency.is_zero() {
            tokio::time::sleep(self.behavior.latency).await;
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.behavior.transient_failures {
            return Err(BmcError::Unreachable(format!("{}: transient failure", self.host)));
        }

        if let Some((status, payload)) = &self.behavior.vendor_error {
            return Err(BmcError::Vendor {
                status: *status,
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    const fn accepted() -> ActionAck {
        ActionAck {
            status: 202,
            location: None,
        }
    }
}

#[async_trait]
impl BmcClient for MockBmc {
    fn vendor(&self) -> &str {
        "Mock"
    }

    fn capabilities(&self) -> &[Capability] {
        &self.behavior.capabilities
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        self.run("system_info", None).await?;
        Ok(SystemInfo {
            name: self.host.clone(),
            power_state: Some("On".to_string()),
            health: Some("OK".to_string()),
            ..SystemInfo::default()
        })
    }

    async fn power_os(
        &self,
        _action: PowerAction,
        _boot_override: Option<BootOverride>,
    ) -> Result<ActionAck> {
        self.run("power_os", Some(Capability::PowerControl)).await?;
        Ok(Self::accepted())
    }

    async fn reset_bmc(&self) -> Result<ActionAck> {
        self.run("reset_bmc", Some(Capability::PowerControl)).await?;
        Ok(Self::accepted())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.run("list_jobs", Some(Capability::JobManagement)).await?;
        Ok(vec![Job {
            id: "JID_000000000001".to_string(),
            name: Some("Firmware Update".to_string()),
            job_state: Some("Completed".to_string()),
            job_status: Some("OK".to_string()),
            percent_complete: Some(100),
            messages: Vec::new(),
        }])
    }

    async fn delete_jobs(&self, _ids: &[String]) -> Result<ActionAck> {
        self.run("delete_jobs", Some(Capability::JobManagement)).await?;
        Ok(Self::accepted())
    }

    async fn clear_sel(&self) -> Result<ActionAck> {
        self.run("clear_sel", Some(Capability::SelClear)).await?;
        Ok(Self::accepted())
    }

    async fn metric_reports(&self) -> Result<Vec<MetricReport>> {
        self.run("metric_reports", Some(Capability::MetricReports)).await?;
        Ok(vec![MetricReport {
            id: "PowerMetrics".to_string(),
            name: Some("Power Metrics".to_string()),
            timestamp: None,
            metric_values: vec![json!({
                "MetricId": "SystemPowerConsumption",
                "MetricValue": "350",
            })],
        }])
    }

    async fn import_configuration(
        &self,
        _shutdown: ShutdownType,
        buffer: &str,
    ) -> Result<ActionAck> {
        self.run("import_configuration", Some(Capability::ConfigurationImport))
            .await?;
        if buffer.is_empty() {
            return Err(BmcError::Vendor {
                status: 400,
                payload: json!({"error": "empty ImportBuffer"}),
            });
        }
        Ok(Self::accepted())
    }

    async fn firmware_updates(&self, _repo: &FirmwareRepo) -> Result<Value> {
        self.run("firmware_updates", Some(Capability::FirmwareCatalogInstall))
            .await?;
        Ok(json!({"PackageList": []}))
    }

    async fn install_from_repo(&self, _repo: &FirmwareRepo, _reboot: bool) -> Result<ActionAck> {
        self.run("install_from_repo", Some(Capability::FirmwareCatalogInstall))
            .await?;
        Ok(Self::accepted())
    }
}

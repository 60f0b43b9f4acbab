//! Fan-out of BMC operations over a node set.
//!
//! Each node runs in its own task on a [`JoinSet`], bounded by a semaphore
//! shared by every batch of the engine. A node's failure never affects
//! another node. Each attempt is bounded by the operation's timeout;
//! retriable failures are retried with exponential backoff. A batch deadline
//! aborts whatever is still running and reports those nodes as timed out.

use std::collections::HashMap;
use std::sync::Arc;

use grendel_bmc::{BmcClient, BmcConnector, BmcError, BootOverride, PowerAction};
use grendel_store::{NetInterface, Node};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{ControlError, Result};
use crate::lifecycle::{NodeRun, NodeState};
use crate::template::{self, Vars};
use crate::types::{BatchReport, EngineConfig, FailureReason, NodeOutcome, NodeResult, Operation};

/// Attempts made so far, per node, visible after a task is aborted.
type Progress = Arc<Mutex<HashMap<String, u32>>>;

/// One node's share of a batch.
struct NodeJob {
    name: String,
    host: Option<String>,
    /// Rendered configuration for `ImportConfiguration`.
    buffer: Option<String>,
}

/// The orchestration engine.
pub struct Engine<B: BmcConnector> {
    connector: Arc<B>,
    config: Arc<EngineConfig>,
    semaphore: Arc<Semaphore>,
}

impl<B: BmcConnector + 'static> Engine<B> {
    /// Create an engine.
    #[must_use]
    pub fn new(connector: Arc<B>, config: EngineConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            connector,
            config: Arc::new(config),
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `operation` on every node, returning one result per node in input order.
    ///
    /// # Errors
    ///
    /// Returns an error only when the operation cannot start at all, e.g. a
    /// missing configuration template. Per-node failures are in the report.
    pub async fn run(&self, nodes: Vec<Node>, operation: Operation) -> Result<BatchReport> {
        let template = self.load_template(&operation).await?;
        let jobs: Vec<NodeJob> = nodes
            .iter()
            .map(|node| NodeJob {
                name: node.name.clone(),
                host: node
                    .bmc_interface()
                    .and_then(NetInterface::host)
                    .map(str::to_string),
                buffer: template
                    .as_deref()
                    .map(|t| template::render(t, &Vars::for_node(node))),
            })
            .collect();
        let names: Vec<String> = jobs.iter().map(|j| j.name.clone()).collect();

        let operation = Arc::new(operation);
        let progress: Progress = Arc::default();
        let deadline = Instant::now() + self.config.batch_timeout();

        tracing::info!(
            operation = operation.name(),
            nodes = names.len(),
            "Dispatching batch"
        );

        let mut tasks = JoinSet::new();
        for job in jobs {
            tasks.spawn(run_node(
                Arc::clone(&self.connector),
                Arc::clone(&self.semaphore),
                Arc::clone(&self.config),
                Arc::clone(&operation),
                Arc::clone(&progress),
                job,
            ));
        }

        let mut finished: HashMap<String, NodeResult> = HashMap::with_capacity(names.len());
        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    finished.insert(result.name.clone(), result);
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(operation = operation.name(), error = %e, "Node task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    tasks.abort_all();
                    break;
                }
            }
        }
        drop(tasks);

        let progress = progress.lock();
        let results: Vec<NodeResult> = names
            .into_iter()
            .map(|name| {
                finished.remove(&name).unwrap_or_else(|| {
                    let reason = if timed_out {
                        FailureReason::Timeout
                    } else {
                        FailureReason::Internal("node task ended without a result".to_string())
                    };
                    tracing::warn!(
                        node = %name,
                        operation = operation.name(),
                        "Node did not finish"
                    );
                    NodeResult {
                        attempts: progress.get(&name).copied().unwrap_or(0),
                        name,
                        outcome: NodeOutcome::Failed(reason),
                    }
                })
            })
            .collect();
        drop(progress);

        let report = BatchReport {
            operation: operation.name(),
            results,
            event_id: None,
        };
        tracing::info!(
            operation = report.operation,
            timed_out,
            severity = ?report.severity(),
            "{}",
            report.summary()
        );
        Ok(report)
    }

    async fn load_template(&self, operation: &Operation) -> Result<Option<String>> {
        let Operation::ImportConfiguration { template, .. } = operation else {
            return Ok(None);
        };
        let Some(dir) = &self.config.template_dir else {
            return Err(ControlError::Validation(
                "no template directory is configured".to_string(),
            ));
        };
        template::load(dir, template).await.map(Some)
    }
}

/// Drive one node to a terminal state.
async fn run_node<B: BmcConnector>(
    connector: Arc<B>,
    semaphore: Arc<Semaphore>,
    config: Arc<EngineConfig>,
    operation: Arc<Operation>,
    progress: Progress,
    job: NodeJob,
) -> NodeResult {
    let mut run = NodeRun::new(&job.name);
    let outcome = drive(
        &mut run,
        &*connector,
        &semaphore,
        &config,
        &operation,
        &progress,
        &job,
    )
    .await;

    let terminal = match &outcome {
        NodeOutcome::Succeeded { .. } => NodeState::Succeeded,
        NodeOutcome::Failed(_) => NodeState::Failed,
        NodeOutcome::Skipped(_) => NodeState::Skipped,
    };
    if let Err(e) = run.advance(terminal) {
        tracing::error!(node = %job.name, error = %e, "Lifecycle violation");
    }

    match &outcome {
        NodeOutcome::Failed(reason) => tracing::warn!(
            node = %job.name,
            operation = operation.name(),
            attempts = run.attempts(),
            reason = %reason.message(),
            "Node operation failed"
        ),
        NodeOutcome::Skipped(capability) => tracing::info!(
            node = %job.name,
            operation = operation.name(),
            %capability,
            "Node skipped"
        ),
        NodeOutcome::Succeeded { .. } => tracing::debug!(
            node = %job.name,
            operation = operation.name(),
            attempts = run.attempts(),
            "Node operation succeeded"
        ),
    }

    NodeResult {
        name: job.name,
        outcome,
        attempts: run.attempts(),
    }
}

async fn drive<B: BmcConnector>(
    run: &mut NodeRun,
    connector: &B,
    semaphore: &Semaphore,
    config: &EngineConfig,
    operation: &Operation,
    progress: &Progress,
    job: &NodeJob,
) -> NodeOutcome {
    let Some(host) = job.host.as_deref() else {
        return NodeOutcome::Failed(FailureReason::NoBmcConfigured);
    };

    let timeout = config.attempt_timeout(operation);
    let mut client: Option<Box<dyn BmcClient>> = None;
    loop {
        // Held per attempt, so nodes waiting out a backoff leave room for others.
        let Ok(permit) = semaphore.acquire().await else {
            return NodeOutcome::Failed(FailureReason::Internal("engine is shut down".to_string()));
        };
        let attempt = match run.dispatch() {
            Ok(attempt) => attempt,
            Err(e) => return NodeOutcome::Failed(FailureReason::Internal(e.to_string())),
        };
        progress.lock().insert(job.name.clone(), attempt);

        let result = tokio::time::timeout(
            timeout,
            attempt_once(connector, &mut client, host, operation, job.buffer.as_deref()),
        )
        .await
        .unwrap_or(Err(BmcError::Timeout));
        drop(permit);

        match result {
            Ok(data) => return NodeOutcome::Succeeded { data },
            Err(BmcError::Unsupported(capability)) => return NodeOutcome::Skipped(capability),
            Err(e) if e.is_retriable() && attempt <= config.retries => {
                let delay = config.backoff(attempt);
                tracing::debug!(
                    node = %job.name,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying node"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return NodeOutcome::Failed(e.into()),
        }
    }
}

/// One connect-and-call attempt. The client is reused by later attempts.
async fn attempt_once<B: BmcConnector>(
    connector: &B,
    client: &mut Option<Box<dyn BmcClient>>,
    host: &str,
    operation: &Operation,
    buffer: Option<&str>,
) -> grendel_bmc::Result<Option<Value>> {
    if client.is_none() {
        *client = Some(connector.connect(host).await?);
    }
    let Some(bmc) = client.as_deref() else {
        return Err(BmcError::Unreachable(host.to_string()));
    };

    if let Some(capability) = operation.capability() {
        if !bmc.supports(capability) {
            return Err(BmcError::Unsupported(capability));
        }
    }

    let data = match operation {
        Operation::SystemInfo => to_value(&bmc.system_info().await?),
        Operation::ListJobs => to_value(&bmc.list_jobs().await?),
        Operation::DeleteJobs { ids } => to_value(&bmc.delete_jobs(ids).await?),
        Operation::PowerOs {
            action,
            boot_override,
        } => to_value(&bmc.power_os(*action, *boot_override).await?),
        Operation::PowerBmc => to_value(&bmc.reset_bmc().await?),
        Operation::ClearSel => to_value(&bmc.clear_sel().await?),
        Operation::Metrics => to_value(&bmc.metric_reports().await?),
        Operation::ImportConfiguration { shutdown, .. } => {
            let ack = bmc
                .import_configuration(*shutdown, buffer.unwrap_or_default())
                .await?;
            to_value(&ack)
        }
        Operation::AutoConfigure => to_value(
            &bmc.power_os(PowerAction::ForceRestart, Some(BootOverride::Pxe))
                .await?,
        ),
        Operation::FirmwareCheck { repo } => Some(bmc.firmware_updates(repo).await?),
        Operation::FirmwareInstall { repo, reboot } => {
            to_value(&bmc.install_from_repo(repo, *reboot).await?)
        }
    };
    Ok(data)
}

fn to_value<T: serde::Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

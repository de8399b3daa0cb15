//! Graceful shutdown
//!
//! Drains extensions before they stop: shutdown hooks run, new traffic is
//! refused, pending requests get a bounded window to finish, remaining
//! connections are dropped and the extension is stopped. A stop that fails
//! is retried once directly against the record.

use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use omnihost_core::error::{LifecycleError, ShutdownError};
use omnihost_core::types::{ProtocolFamily, ShutdownStatus};
use omnihost_extension_api::{Extension, ExtensionStatistics};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::protocol::ProtocolGateway;
use crate::registry::ExtensionRegistry;

/// Default interval between pending-request polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of [`ShutdownManager::drain_all`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    /// Ids in the order their drains were issued (priority descending)
    pub issued: Vec<String>,
    /// Ids in the order their drains finished
    pub completed: Vec<String>,
    /// Drains that ended in an error
    pub failed: BTreeMap<String, String>,
    /// Drains still running when the deadline passed
    pub unfinished: Vec<String>,
    pub timed_out: bool,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.timed_out
    }
}

/// Coordinates draining. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ShutdownManager {
    registry: Arc<ExtensionRegistry>,
    gateways: Arc<DashMap<ProtocolFamily, Arc<dyn ProtocolGateway>>>,
    poll_interval: Duration,
}

impl ShutdownManager {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            registry,
            gateways: Arc::new(DashMap::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Registers the gateway serving `family`, replacing any previous one.
    pub fn register_gateway(&self, family: ProtocolFamily, gateway: Arc<dyn ProtocolGateway>) {
        if self.gateways.insert(family, gateway).is_some() {
            warn!(family = %family, "Replacing protocol gateway");
        }
    }

    fn gateway_for(&self, extension_id: &str) -> Option<Arc<dyn ProtocolGateway>> {
        let family = ProtocolFamily::from_extension_id(extension_id)?;
        self.gateways.get(&family).map(|g| Arc::clone(g.value()))
    }

    /// Drains one extension.
    ///
    /// Only a stop that still fails after the forced retry is an error;
    /// hook and gateway failures are logged.
    pub async fn drain(
        &self,
        record: Arc<dyn Extension>,
        timeout: Duration,
    ) -> Result<(), LifecycleError> {
        let id = record.id().to_string();
        info!(extension_id = %id, timeout_ms = timeout.as_millis() as u64, "Draining extension");

        if let Some(hooks) = record.shutdown_hooks() {
            if let Err(e) = hooks.prepare_for_shutdown().await {
                let err = ShutdownError::hook_failed(&id, "prepare_for_shutdown", format!("{:#}", e));
                warn!(error = %err, "Continuing drain");
            }
        }

        record.set_enabled(false);
        let gateway = self.gateway_for(&id);
        if let Some(gateway) = &gateway {
            if let Err(e) = gateway.stop_accepting(&id).await {
                warn!(extension_id = %id, error = %e, "Gateway failed to stop accepting traffic");
            }
        }

        if let Some(stats) = record.statistics() {
            self.wait_for_pending(&id, stats, timeout).await;
        }

        if let Some(hooks) = record.shutdown_hooks() {
            if let Err(e) = hooks.close_all_connections().await {
                let err = ShutdownError::hook_failed(&id, "close_all_connections", format!("{:#}", e));
                warn!(error = %err, "Continuing drain");
            }
        }
        if let Some(gateway) = &gateway {
            if let Err(e) = gateway.close_all_connections(&id).await {
                warn!(extension_id = %id, error = %e, "Gateway failed to close connections");
            }
        }

        self.stop_with_retry(&id, &record).await?;
        info!(extension_id = %id, "Extension drained");
        Ok(())
    }

    /// Polls pending requests until zero or the deadline passes.
    async fn wait_for_pending(&self, id: &str, stats: &dyn ExtensionStatistics, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = stats.pending_request_count();
            if pending == 0 {
                debug!(extension_id = %id, "No pending requests");
                return;
            }

            let now = Instant::now();
            if now >= deadline {
                let err = ShutdownError::Timeout {
                    extension_id: id.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                    pending,
                };
                warn!(error = %err, "Forcing stop");
                return;
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn stop_with_retry(&self, id: &str, record: &Arc<dyn Extension>) -> Result<(), LifecycleError> {
        let first = match self.registry.stop(id).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        warn!(extension_id = %id, error = %first, "Stop failed, forcing");
        record.stop().await.map_err(|e| {
            LifecycleError::stop_failed(id, format!("forced stop failed: {:#}", e))
        })?;
        info!(extension_id = %id, "Forced stop succeeded");
        Ok(())
    }

    /// Drains every registered extension concurrently.
    ///
    /// Drains are issued in descending priority (ties by id); completion
    /// order is whatever the drains produce. The whole batch is bounded by
    /// `timeout`; drains still running at the deadline are left detached.
    pub async fn drain_all(&self, timeout: Duration) -> DrainReport {
        let mut records = self.registry.get_all();
        records.sort_by(|a, b| b.priority().cmp(&a.priority()).then_with(|| a.id().cmp(b.id())));

        let mut report = DrainReport::default();
        if records.is_empty() {
            debug!("Nothing to drain");
            return report;
        }

        info!(count = records.len(), timeout_ms = timeout.as_millis() as u64, "Draining all extensions");
        let deadline = Instant::now() + timeout;

        let mut tasks = FuturesUnordered::new();
        for record in records {
            let id = record.id().to_string();
            debug!(extension_id = %id, priority = record.priority(), "Issuing drain");
            report.issued.push(id.clone());

            let manager = self.clone();
            let handle = tokio::spawn(async move { manager.drain(record, timeout).await });
            tasks.push(async move { (id, handle.await) });
        }

        loop {
            match tokio::time::timeout_at(deadline, tasks.next()).await {
                Ok(Some((id, Ok(Ok(()))))) => report.completed.push(id),
                Ok(Some((id, Ok(Err(e))))) => {
                    warn!(extension_id = %id, error = %e, "Drain failed");
                    report.failed.insert(id, e.to_string());
                }
                Ok(Some((id, Err(join_err)))) => {
                    let err = LifecycleError::TaskFailed {
                        extension_id: id.clone(),
                        reason: join_err.to_string(),
                    };
                    warn!(error = %err, "Drain task failed");
                    report.failed.insert(id, err.to_string());
                }
                Ok(None) => break,
                Err(_) => {
                    let err = ShutdownError::DrainAllTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    };
                    report.timed_out = true;
                    report.unfinished = report
                        .issued
                        .iter()
                        .filter(|id| !report.completed.contains(id) && !report.failed.contains_key(*id))
                        .cloned()
                        .collect();
                    warn!(error = %err, unfinished = ?report.unfinished, "Abandoning remaining drains");
                    break;
                }
            }
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            timed_out = report.timed_out,
            "Drain of all extensions finished"
        );
        report
    }

    /// Current request/connection picture for `record`.
    pub fn shutdown_status(&self, record: &dyn Extension) -> ShutdownStatus {
        let id = record.id();
        let (pending, active_requests, stats_connections) = match record.statistics() {
            Some(stats) => (
                stats.pending_request_count(),
                stats.active_request_count(),
                stats.active_connection_count(),
            ),
            None => (0, 0, 0),
        };
        let gateway_connections = self
            .gateway_for(id)
            .map(|g| g.active_connection_count(id))
            .unwrap_or(0);

        ShutdownStatus {
            extension_id: id.to_string(),
            can_shutdown_safely: pending == 0 && active_requests == 0,
            active_requests,
            active_connections: stats_connections.max(gateway_connections),
        }
    }

    /// Status for a registered id.
    pub fn status_of(&self, id: &str) -> Option<ShutdownStatus> {
        self.registry
            .get(id)
            .map(|record| self.shutdown_status(record.as_ref()))
    }
}

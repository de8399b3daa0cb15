//! Batch lifecycle operations by extension id.
//!
//! Every id is processed on its own task under a per-id deadline. Ids are
//! handled one at a time in the order given, duplicates dropped.

use omnihost_core::error::{HostError, LifecycleError};
use omnihost_core::types::{
    ExtensionChange, ExtensionDescriptor, ExtensionEvent, OperationResult, ShutdownStatus,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::discovery::ExtensionDiscovery;
use crate::handler::LifecycleHandler;

/// Status line for one registered extension.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionStatus {
    pub id: String,
    pub name: String,
    pub version: String,
    pub author: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub started: bool,
    pub fingerprint: Option<String>,
    pub shutdown: ShutdownStatus,
}

pub struct LifecycleOperations {
    handler: Arc<LifecycleHandler>,
    discovery: Arc<ExtensionDiscovery>,
}

impl LifecycleOperations {
    pub fn new(handler: Arc<LifecycleHandler>, discovery: Arc<ExtensionDiscovery>) -> Self {
        Self { handler, discovery }
    }

    /// Per-id deadline from configuration.
    pub fn default_timeout(&self) -> Duration {
        self.handler.config().operation_timeout()
    }

    pub async fn enable_extensions<S: AsRef<str>>(&self, ids: &[S], timeout: Duration) -> OperationResult {
        self.run_ids(ExtensionChange::Enable, ids, timeout).await
    }

    pub async fn disable_extensions<S: AsRef<str>>(&self, ids: &[S], timeout: Duration) -> OperationResult {
        self.run_ids(ExtensionChange::Disable, ids, timeout).await
    }

    pub async fn update_extensions<S: AsRef<str>>(&self, ids: &[S], timeout: Duration) -> OperationResult {
        self.run_ids(ExtensionChange::Update, ids, timeout).await
    }

    pub async fn remove_extensions<S: AsRef<str>>(&self, ids: &[S], timeout: Duration) -> OperationResult {
        self.run_ids(ExtensionChange::Remove, ids, timeout).await
    }

    /// Runs `change` for fully specified descriptors.
    pub async fn apply(
        &self,
        change: ExtensionChange,
        descriptors: Vec<ExtensionDescriptor>,
        timeout: Duration,
    ) -> OperationResult {
        let mut seen = HashSet::new();
        let events: Vec<ExtensionEvent> = descriptors
            .into_iter()
            .filter(|d| seen.insert(d.id.clone()))
            .map(|d| ExtensionEvent::new(change, d))
            .collect();
        self.run_events(events, timeout).await
    }

    async fn run_ids<S: AsRef<str>>(
        &self,
        change: ExtensionChange,
        ids: &[S],
        timeout: Duration,
    ) -> OperationResult {
        let mut seen = HashSet::new();
        let events: Vec<ExtensionEvent> = ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| seen.insert(id.to_string()))
            .map(|id| ExtensionEvent::new(change, self.descriptor_for(id)))
            .collect();
        self.run_events(events, timeout).await
    }

    /// Reads the manifest if one can be found, otherwise derives a minimal
    /// descriptor from the id.
    fn descriptor_for(&self, id: &str) -> ExtensionDescriptor {
        match self.discovery.descriptor_for(id) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!(extension_id = %id, reason = %e, "Using minimal descriptor");
                ExtensionDescriptor::minimal(id, &self.discovery.config().root)
            }
        }
    }

    async fn run_events(&self, events: Vec<ExtensionEvent>, timeout: Duration) -> OperationResult {
        let mut result = OperationResult::new();
        for event in events {
            let id = event.extension_id().to_string();
            let change = event.change;

            let handler = Arc::clone(&self.handler);
            let task = tokio::spawn(async move { handler.handle(&event).await });

            let outcome: Result<(), HostError> = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_err)) => Err(LifecycleError::TaskFailed {
                    extension_id: id.clone(),
                    reason: join_err.to_string(),
                }
                .into()),
                Err(_) => Err(LifecycleError::timeout(
                    &id,
                    change.to_string(),
                    timeout.as_millis() as u64,
                )
                .into()),
            };

            match outcome {
                Ok(()) => result.record_success(&id),
                Err(e) => {
                    warn!(extension_id = %id, change = %change, error = %e, "Lifecycle operation failed");
                    result.record_failure(&id, e.to_string());
                }
            }
        }

        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Lifecycle batch finished"
        );
        result
    }

    /// Status of every registered extension, sorted by id.
    pub fn status(&self) -> Vec<ExtensionStatus> {
        let registry = self.handler.registry();
        let shutdown = self.handler.shutdown_manager();
        let mut statuses: Vec<ExtensionStatus> = registry
            .get_all()
            .into_iter()
            .map(|record| ExtensionStatus {
                id: record.id().to_string(),
                name: record.name().to_string(),
                version: record.version().to_string(),
                author: record.author().map(str::to_string),
                priority: record.priority(),
                enabled: record.is_enabled(),
                started: record.is_started(),
                fingerprint: registry
                    .context(record.id())
                    .and_then(|c| c.fingerprint().map(str::to_string)),
                shutdown: shutdown.shutdown_status(record.as_ref()),
            })
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }
}

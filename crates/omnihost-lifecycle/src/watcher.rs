//! Hot reload
//!
//! Periodically compares the extension root with the registry and feeds the
//! difference to the lifecycle handler.

use omnihost_core::types::{ExtensionChange, ExtensionEvent, OperationResult};
use omnihost_extension_api::Extension;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::ExtensionDiscovery;
use crate::handler::LifecycleHandler;
use crate::registry::ExtensionRegistry;

/// Events that bring the registry in line with what is on disk.
///
/// - new folder: Enable
/// - registered from a different manifest version: Update
/// - registered but disabled, marker gone: Enable
/// - disable marker added to a running extension: Disable
/// - folder deleted: Remove
///
/// A registered extension whose folder still exists but whose manifest no
/// longer parses is left alone.
pub fn reconcile(discovery: &ExtensionDiscovery, registry: &ExtensionRegistry) -> Vec<ExtensionEvent> {
    let scanned = discovery.scan();
    let mut on_disk = HashSet::new();
    let mut events = Vec::new();

    for event in scanned {
        let id = event.extension_id().to_string();
        on_disk.insert(id.clone());
        let current = registry.get(&id);

        let change = match (event.change, current) {
            (ExtensionChange::Enable, None) => Some(ExtensionChange::Enable),
            (ExtensionChange::Enable, Some(record))
                if loaded_version(registry, record.as_ref()) != event.descriptor.version =>
            {
                Some(ExtensionChange::Update)
            }
            (ExtensionChange::Enable, Some(record)) if !record.is_enabled() => Some(ExtensionChange::Enable),
            (ExtensionChange::Disable, Some(record)) if record.is_enabled() => Some(ExtensionChange::Disable),
            _ => None,
        };

        if let Some(change) = change {
            debug!(extension_id = %id, change = %change, "Reconcile");
            events.push(ExtensionEvent::new(change, event.descriptor));
        }
    }

    for record in registry.get_all() {
        if on_disk.contains(record.id()) {
            continue;
        }
        let folder = record.folder_path();
        let folder_gone = folder.as_os_str().is_empty() || !folder.exists();
        if folder_gone && discovery.locate_folder(record.id()).is_err() {
            debug!(extension_id = %record.id(), "Reconcile: folder gone");
            events.push(ExtensionEvent::remove(record.metadata().clone()));
        }
    }

    events
}

/// Manifest version a record was loaded from. Falls back to what the record
/// reports when its context is gone.
fn loaded_version(registry: &ExtensionRegistry, record: &dyn Extension) -> String {
    registry
        .context(record.id())
        .and_then(|context| context.source_version().map(str::to_string))
        .unwrap_or_else(|| record.version().to_string())
}

/// Background task running [`reconcile`] on an interval.
pub struct HotReloadWatcher {
    handler: Arc<LifecycleHandler>,
    discovery: Arc<ExtensionDiscovery>,
    interval: Duration,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HotReloadWatcher {
    pub fn new(
        handler: Arc<LifecycleHandler>,
        discovery: Arc<ExtensionDiscovery>,
        interval: Duration,
    ) -> Self {
        Self {
            handler,
            discovery,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Runs one reconcile pass.
    pub async fn poll_once(&self) -> OperationResult {
        poll(&self.discovery, &self.handler).await
    }

    /// Starts the background loop. Starting twice is a no-op.
    pub fn start(&self) {
        if self.interval.is_zero() {
            warn!("Hot reload interval is zero, not starting");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Hot reload already running");
            return;
        }

        let handler = Arc::clone(&self.handler);
        let discovery = Arc::clone(&self.discovery);
        let running = Arc::clone(&self.running);
        let stop_signal = Arc::clone(&self.stop_signal);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "Hot reload started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; the initial scan is done by the host
            ticker.tick().await;

            while running.load(Ordering::Relaxed) {
                tokio::select! {
                    _ = ticker.tick() => {
                        poll(&discovery, &handler).await;
                    }
                    _ = stop_signal.notified() => break,
                }
            }
            info!("Hot reload stopped");
        });

        *self.task.lock() = Some(handle);
    }

    /// Stops the loop and waits for an in-flight pass to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stop_signal.notify_one();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Hot reload task ended abnormally");
            }
        }
    }
}

async fn poll(discovery: &ExtensionDiscovery, handler: &LifecycleHandler) -> OperationResult {
    let events = reconcile(discovery, handler.registry());
    if events.is_empty() {
        return OperationResult::new();
    }
    info!(changes = events.len(), "Hot reload applying changes");
    handler.handle_batch(&events).await
}

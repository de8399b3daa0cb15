use async_trait::async_trait;
use omnihost_core::types::ExtensionDescriptor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::isolation::IsolationContext;

/// Capability set every loaded extension exposes to the host.
///
/// Implementations are shared behind `Arc<dyn Extension>`, so state changes
/// go through interior mutability. [`ExtensionState`] covers the common
/// bookkeeping.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Descriptor this instance was built from
    fn metadata(&self) -> &ExtensionDescriptor;

    fn id(&self) -> &str {
        &self.metadata().id
    }

    fn name(&self) -> &str {
        self.metadata().display_name()
    }

    fn version(&self) -> &str {
        &self.metadata().version
    }

    fn author(&self) -> Option<&str> {
        self.metadata().author.as_deref()
    }

    fn priority(&self) -> i32 {
        self.metadata().priority
    }

    fn start_priority(&self) -> i32 {
        self.metadata().start_priority
    }

    fn folder_path(&self) -> &Path {
        &self.metadata().folder_path
    }

    /// Isolation context the instance's code was resolved through
    fn isolation_context(&self) -> Option<Arc<IsolationContext>>;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    fn is_started(&self) -> bool;

    fn is_stopped(&self) -> bool {
        !self.is_started()
    }

    /// Releases resources after removal; `disable` is set when the extension
    /// is going away rather than being replaced.
    async fn cleanup(&self, _disable: bool) -> anyhow::Result<()> {
        Ok(())
    }

    /// Request/connection telemetry, if the extension tracks it
    fn statistics(&self) -> Option<&dyn ExtensionStatistics> {
        None
    }

    /// Graceful-shutdown hooks, if the extension provides them
    fn shutdown_hooks(&self) -> Option<&dyn GracefulShutdown> {
        None
    }
}

/// Request and connection counters consulted while draining.
pub trait ExtensionStatistics: Send + Sync {
    fn pending_request_count(&self) -> u64;

    fn active_request_count(&self) -> u64;

    fn active_connection_count(&self) -> u64;
}

/// Optional hooks invoked by the shutdown manager.
#[async_trait]
pub trait GracefulShutdown: Send + Sync {
    /// Called before the extension stops accepting new work
    async fn prepare_for_shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after draining to drop whatever connections remain
    async fn close_all_connections(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Shared lifecycle bookkeeping for extension implementations.
#[derive(Debug)]
pub struct ExtensionState {
    descriptor: ExtensionDescriptor,
    isolation: Option<Arc<IsolationContext>>,
    enabled: AtomicBool,
    started: AtomicBool,
    starts: AtomicU64,
    stops: AtomicU64,
}

impl ExtensionState {
    pub fn new(descriptor: ExtensionDescriptor, isolation: Option<Arc<IsolationContext>>) -> Self {
        Self {
            descriptor,
            isolation,
            enabled: AtomicBool::new(true),
            started: AtomicBool::new(false),
            starts: AtomicU64::new(0),
            stops: AtomicU64::new(0),
        }
    }

    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    pub fn isolation(&self) -> Option<Arc<IsolationContext>> {
        self.isolation.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn mark_stopped(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of completed start() calls
    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of completed stop() calls
    pub fn stop_count(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Atomic request/connection counters implementing [`ExtensionStatistics`].
#[derive(Debug, Default)]
pub struct RequestCounters {
    pending: AtomicU64,
    active: AtomicU64,
    connections: AtomicU64,
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a request as accepted and in flight.
    pub fn begin_request(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    /// Marks a request as finished.
    pub fn end_request(&self) {
        saturating_decrement(&self.pending);
        saturating_decrement(&self.active);
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connection_closed(&self) {
        saturating_decrement(&self.connections);
    }

    /// Drops all connection counts to zero.
    pub fn reset_connections(&self) {
        self.connections.store(0, Ordering::SeqCst);
    }
}

fn saturating_decrement(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
}

impl ExtensionStatistics for RequestCounters {
    fn pending_request_count(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    fn active_request_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    fn active_connection_count(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }
}

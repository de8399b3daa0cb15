//! Common test utilities for lifecycle integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use omnihost_core::config::{ExtensionsConfig, HostConfig, LifecycleConfig};
use omnihost_core::types::ExtensionDescriptor;
use omnihost_extension_api::{
    ConstructionContext, Extension, ExtensionFactory, ExtensionState, ExtensionStatistics,
    FactoryTable, GracefulShutdown, IsolationContext, ParamType, RequestCounters,
};
use omnihost_lifecycle::ExtensionHost;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Shared record of what the test extensions did, in order.
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
    instances: Mutex<HashMap<String, Vec<Arc<RecordingExtension>>>>,
    drain_delays: Mutex<HashMap<String, Duration>>,
    stuck: Mutex<HashSet<String>>,
    failing_start: Mutex<HashSet<String>>,
    failing_stop: Mutex<HashSet<String>>,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Entries starting with `prefix`, e.g. `"stop:"`.
    pub fn entries_with(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Every instance built for `id`, oldest first.
    pub fn instances(&self, id: &str) -> Vec<Arc<RecordingExtension>> {
        self.instances.lock().get(id).cloned().unwrap_or_default()
    }

    pub fn latest(&self, id: &str) -> Option<Arc<RecordingExtension>> {
        self.instances(id).last().cloned()
    }

    /// Makes `prepare_for_shutdown` of `id` take `delay`.
    pub fn delay_drain(&self, id: &str, delay: Duration) {
        self.drain_delays.lock().insert(id.to_string(), delay);
    }

    /// New instances of `id` start with a request that never finishes.
    pub fn stick(&self, id: &str) {
        self.stuck.lock().insert(id.to_string());
    }

    pub fn fail_start(&self, id: &str) {
        self.failing_start.lock().insert(id.to_string());
    }

    /// Every instance of `id`, including running ones, fails to stop.
    pub fn fail_stop(&self, id: &str) {
        self.failing_stop.lock().insert(id.to_string());
    }

    /// Factory building [`RecordingExtension`]s, accepting zero to three
    /// arguments of any type.
    pub fn factory(self: &Arc<Self>, entry_point: &str) -> ExtensionFactory {
        let mut factory = ExtensionFactory::new(entry_point);
        for arity in 0..=3 {
            let journal = Arc::clone(self);
            factory = factory.constructor(vec![ParamType::Any; arity], move |ctx, _| {
                Ok(journal.build(ctx) as Arc<dyn Extension>)
            });
        }
        factory
    }

    fn build(self: &Arc<Self>, ctx: &ConstructionContext) -> Arc<RecordingExtension> {
        let id = ctx.extension_id.clone();
        let extension = Arc::new(RecordingExtension {
            state: ExtensionState::new(ctx.descriptor.clone(), Some(Arc::clone(&ctx.isolation))),
            counters: RequestCounters::new(),
            journal: Arc::clone(self),
            drain_delay: self.drain_delays.lock().get(&id).copied(),
            fail_start: self.failing_start.lock().contains(&id),
        });
        if self.stuck.lock().contains(&id) {
            extension.counters.begin_request();
        }
        self.record(format!("build:{}:{}", id, ctx.descriptor.version));
        self.instances
            .lock()
            .entry(id)
            .or_default()
            .push(Arc::clone(&extension));
        extension
    }
}

/// Extension that journals every lifecycle call.
pub struct RecordingExtension {
    pub state: ExtensionState,
    pub counters: RequestCounters,
    journal: Arc<Journal>,
    drain_delay: Option<Duration>,
    fail_start: bool,
}

#[async_trait]
impl Extension for RecordingExtension {
    fn metadata(&self) -> &ExtensionDescriptor {
        self.state.descriptor()
    }

    fn isolation_context(&self) -> Option<Arc<IsolationContext>> {
        self.state.isolation()
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.fail_start {
            self.journal.record(format!("start-failed:{}", self.id()));
            anyhow::bail!("port already in use");
        }
        self.state.mark_started();
        self.journal.record(format!("start:{}", self.id()));
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let failing = self.journal.failing_stop.lock().contains(self.id());
        if failing {
            self.journal.record(format!("stop-failed:{}", self.id()));
            anyhow::bail!("listener refused to close");
        }
        self.state.mark_stopped();
        self.journal.record(format!("stop:{}", self.id()));
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.state.set_enabled(enabled);
    }

    fn is_started(&self) -> bool {
        self.state.is_started()
    }

    async fn cleanup(&self, disable: bool) -> anyhow::Result<()> {
        self.journal
            .record(format!("cleanup:{}:{}", self.id(), disable));
        Ok(())
    }

    fn statistics(&self) -> Option<&dyn ExtensionStatistics> {
        Some(&self.counters)
    }

    fn shutdown_hooks(&self) -> Option<&dyn GracefulShutdown> {
        Some(self)
    }
}

#[async_trait]
impl GracefulShutdown for RecordingExtension {
    async fn prepare_for_shutdown(&self) -> anyhow::Result<()> {
        self.journal.record(format!("prepare:{}", self.id()));
        if let Some(delay) = self.drain_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn close_all_connections(&self) -> anyhow::Result<()> {
        self.counters.reset_connections();
        Ok(())
    }
}

/// Temporary extension root with helpers to lay out extension folders.
pub struct ExtensionTree {
    dir: TempDir,
}

impl ExtensionTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn folder(&self, id: &str) -> PathBuf {
        self.root().join(id)
    }

    /// Writes `<root>/<id>/extension.yaml` and `<root>/<id>/<id>.pkg`.
    pub fn add(&self, id: &str, version: &str, priority: i32) -> &Self {
        self.add_with_entry_point(id, version, priority, id)
    }

    pub fn add_with_entry_point(&self, id: &str, version: &str, priority: i32, entry_point: &str) -> &Self {
        let folder = self.folder(id);
        std::fs::create_dir_all(&folder).expect("Failed to create extension folder");
        self.write_manifest(id, version, priority, entry_point);
        std::fs::write(folder.join(format!("{}.pkg", id)), format!("{}@{}", id, version))
            .expect("Failed to write artifact");
        self
    }

    pub fn write_manifest(&self, id: &str, version: &str, priority: i32, entry_point: &str) {
        let manifest = format!(
            "id: {id}\nname: {id} service\nversion: \"{version}\"\nauthor: tests\npriority: {priority}\nentry_point: {entry_point}\n"
        );
        std::fs::write(self.folder(id).join("extension.yaml"), manifest)
            .expect("Failed to write manifest");
    }

    pub fn disable(&self, id: &str) {
        std::fs::write(self.folder(id).join(".disabled"), "").expect("Failed to write marker");
    }

    pub fn enable(&self, id: &str) {
        let _ = std::fs::remove_file(self.folder(id).join(".disabled"));
    }

    pub fn delete(&self, id: &str) {
        std::fs::remove_dir_all(self.folder(id)).expect("Failed to delete extension folder");
    }

    /// Config rooted at this tree with test-friendly timings.
    pub fn config(&self) -> HostConfig {
        HostConfig {
            extensions: ExtensionsConfig {
                load_native_artifacts: false,
                ..ExtensionsConfig::rooted_at(self.root())
            },
            lifecycle: LifecycleConfig {
                settle_delay_ms: 0,
                drain_timeout_ms: 1_000,
                drain_poll_interval_ms: 100,
                operation_timeout_ms: 5_000,
                ..LifecycleConfig::default()
            },
            ..HostConfig::default()
        }
    }
}

/// Host table with a recording factory for each id.
pub fn factories(journal: &Arc<Journal>, ids: &[&str]) -> Arc<FactoryTable> {
    let table = Arc::new(FactoryTable::new());
    for id in ids {
        table.register(journal.factory(id));
    }
    table
}

/// Host over `tree` whose factories cover `ids`.
pub fn host(tree: &ExtensionTree, journal: &Arc<Journal>, ids: &[&str]) -> ExtensionHost {
    host_with_config(tree.config(), journal, ids)
}

pub fn host_with_config(config: HostConfig, journal: &Arc<Journal>, ids: &[&str]) -> ExtensionHost {
    ExtensionHost::builder(config)
        .factories(factories(journal, ids))
        .build()
}

/// Initializes test logging once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

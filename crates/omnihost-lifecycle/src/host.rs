//! Extension host
//!
//! Wires discovery, loading, the registry, the shutdown manager and the
//! lifecycle handler together from a [`HostConfig`].

use omnihost_core::config::HostConfig;
use omnihost_core::types::{OperationResult, ProtocolFamily};
use omnihost_extension_api::FactoryTable;
use std::sync::Arc;
use tracing::info;

use crate::cleanup::CleanupHook;
use crate::dependencies::{DependencyResolver, StaticDependencyResolver};
use crate::discovery::ExtensionDiscovery;
use crate::handler::LifecycleHandler;
use crate::isolation::IsolationLoader;
use crate::operations::LifecycleOperations;
use crate::protocol::ProtocolGateway;
use crate::registry::ExtensionRegistry;
use crate::shutdown::{DrainReport, ShutdownManager};
use crate::watcher::HotReloadWatcher;

pub struct ExtensionHost {
    config: HostConfig,
    factories: Arc<FactoryTable>,
    registry: Arc<ExtensionRegistry>,
    discovery: Arc<ExtensionDiscovery>,
    handler: Arc<LifecycleHandler>,
    operations: LifecycleOperations,
    watcher: HotReloadWatcher,
}

impl ExtensionHost {
    /// Host with no host-linked factories and no dependencies.
    pub fn new(config: HostConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: HostConfig) -> ExtensionHostBuilder {
        ExtensionHostBuilder {
            config,
            factories: Arc::new(FactoryTable::new()),
            resolver: Arc::new(StaticDependencyResolver::new()),
            gateways: Vec::new(),
            cleanup_hooks: Vec::new(),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Factories every isolation context falls back to.
    pub fn factories(&self) -> &Arc<FactoryTable> {
        &self.factories
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn discovery(&self) -> &Arc<ExtensionDiscovery> {
        &self.discovery
    }

    pub fn handler(&self) -> &Arc<LifecycleHandler> {
        &self.handler
    }

    pub fn shutdown_manager(&self) -> &ShutdownManager {
        self.handler.shutdown_manager()
    }

    pub fn operations(&self) -> &LifecycleOperations {
        &self.operations
    }

    pub fn watcher(&self) -> &HotReloadWatcher {
        &self.watcher
    }

    /// Scans the extension root, applies the resulting events and starts hot
    /// reload if configured.
    pub async fn start(&self) -> OperationResult {
        let events = self.discovery.scan();
        info!(root = %self.config.extensions.root.display(), events = events.len(), "Starting extension host");
        let result = self.handler.handle_batch(&events).await;

        if self.config.lifecycle.hot_reload {
            self.watcher.start();
        }

        info!(
            loaded = self.registry.count(),
            failed = result.failed.len(),
            "Extension host started"
        );
        result
    }

    /// Stops hot reload and drains everything.
    pub async fn shutdown(&self) -> DrainReport {
        self.watcher.stop().await;
        self.shutdown_manager()
            .drain_all(self.config.lifecycle.drain_timeout())
            .await
    }
}

pub struct ExtensionHostBuilder {
    config: HostConfig,
    factories: Arc<FactoryTable>,
    resolver: Arc<dyn DependencyResolver>,
    gateways: Vec<(ProtocolFamily, Arc<dyn ProtocolGateway>)>,
    cleanup_hooks: Vec<Arc<dyn CleanupHook>>,
}

impl ExtensionHostBuilder {
    /// Factories linked into the host process.
    pub fn factories(mut self, factories: Arc<FactoryTable>) -> Self {
        self.factories = factories;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn gateway(mut self, family: ProtocolFamily, gateway: Arc<dyn ProtocolGateway>) -> Self {
        self.gateways.push((family, gateway));
        self
    }

    pub fn cleanup_hook(mut self, hook: Arc<dyn CleanupHook>) -> Self {
        self.cleanup_hooks.push(hook);
        self
    }

    pub fn build(self) -> ExtensionHost {
        let config = self.config;
        let registry = Arc::new(ExtensionRegistry::new());
        let discovery = Arc::new(ExtensionDiscovery::new(config.extensions.clone()));

        let shutdown = ShutdownManager::new(Arc::clone(&registry))
            .with_poll_interval(config.lifecycle.drain_poll_interval());
        for (family, gateway) in self.gateways {
            shutdown.register_gateway(family, gateway);
        }

        let loader = IsolationLoader::new(config.extensions.clone(), Arc::clone(&self.factories));
        let handler = Arc::new(LifecycleHandler::new(
            Arc::clone(&registry),
            shutdown,
            loader,
            self.resolver,
            config.lifecycle.clone(),
        ));
        for hook in self.cleanup_hooks {
            handler.add_cleanup_hook(hook);
        }

        let operations = LifecycleOperations::new(Arc::clone(&handler), Arc::clone(&discovery));
        let watcher = HotReloadWatcher::new(
            Arc::clone(&handler),
            Arc::clone(&discovery),
            config.lifecycle.hot_reload_interval(),
        );

        ExtensionHost {
            config,
            factories: self.factories,
            registry,
            discovery,
            handler,
            operations,
            watcher,
        }
    }
}

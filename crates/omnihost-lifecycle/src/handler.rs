//! Lifecycle handler
//!
//! Applies Enable, Disable, Update and Remove events to the registry. Each
//! event is handled to completion before the handler returns.

use omnihost_core::config::LifecycleConfig;
use omnihost_core::error::{HostError, InstantiationError, IsolationLoadError, LifecycleError};
use omnihost_core::types::{ExtensionChange, ExtensionDescriptor, ExtensionEvent, OperationResult};
use omnihost_extension_api::Extension;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cleanup::{run_cleanup_hooks, CleanupHook, CleanupPhase};
use crate::dependencies::{collect_dependencies, DependencyResolver};
use crate::instantiator::DynamicInstantiator;
use crate::isolation::IsolationLoader;
use crate::registry::ExtensionRegistry;
use crate::shutdown::ShutdownManager;

pub struct LifecycleHandler {
    registry: Arc<ExtensionRegistry>,
    shutdown: ShutdownManager,
    loader: IsolationLoader,
    instantiator: DynamicInstantiator,
    resolver: Arc<dyn DependencyResolver>,
    cleanup_hooks: RwLock<Vec<Arc<dyn CleanupHook>>>,
    config: LifecycleConfig,
}

impl LifecycleHandler {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        shutdown: ShutdownManager,
        loader: IsolationLoader,
        resolver: Arc<dyn DependencyResolver>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            registry,
            shutdown,
            loader,
            instantiator: DynamicInstantiator::new(config.synthetic_fallback),
            resolver,
            cleanup_hooks: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn shutdown_manager(&self) -> &ShutdownManager {
        &self.shutdown
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn add_cleanup_hook(&self, hook: Arc<dyn CleanupHook>) {
        self.cleanup_hooks.write().push(hook);
    }

    async fn run_cleanup(&self, extension_id: &str, phase: CleanupPhase) {
        let hooks = self.cleanup_hooks.read().clone();
        run_cleanup_hooks(&hooks, extension_id, phase).await;
    }

    /// Dispatches one event.
    pub async fn handle(&self, event: &ExtensionEvent) -> Result<(), HostError> {
        debug!(
            extension_id = %event.extension_id(),
            change = %event.change,
            folder = %event.folder_path.display(),
            "Handling lifecycle event"
        );
        match event.change {
            ExtensionChange::Enable => self.enable(&event.descriptor).await,
            ExtensionChange::Disable => self.disable(&event.descriptor).await,
            ExtensionChange::Update => self.update(&event.descriptor).await,
            ExtensionChange::Remove => self.remove(&event.descriptor).await,
        }
    }

    /// Handles events one after another. A failing event is logged and
    /// recorded; it does not stop the rest of the batch.
    pub async fn handle_batch(&self, events: &[ExtensionEvent]) -> OperationResult {
        let mut result = OperationResult::new();
        for event in events {
            match self.handle(event).await {
                Ok(()) => result.record_success(event.extension_id()),
                Err(e) => {
                    error!(
                        extension_id = %event.extension_id(),
                        change = %event.change,
                        error = %e,
                        "Lifecycle event failed"
                    );
                    result.record_failure(event.extension_id(), e.to_string());
                }
            }
        }
        result
    }

    /// Loads, registers and starts an extension. A descriptor without an
    /// entry point is a no-op.
    pub async fn enable(&self, descriptor: &ExtensionDescriptor) -> Result<(), HostError> {
        if !descriptor.has_entry_point() {
            info!(extension_id = %descriptor.id, "No entry point declared, nothing to enable");
            return Ok(());
        }

        let record = self.build_instance(descriptor)?;
        self.registry.register(&descriptor.id, record)?;
        self.registry.start(&descriptor.id).await?;
        info!(extension_id = %descriptor.id, version = %descriptor.version, "Extension enabled");
        Ok(())
    }

    /// Drains a registered extension. The record stays registered.
    pub async fn disable(&self, descriptor: &ExtensionDescriptor) -> Result<(), HostError> {
        let Some(record) = self.registry.get(&descriptor.id) else {
            debug!(extension_id = %descriptor.id, "Disable of unregistered extension ignored");
            return Ok(());
        };

        self.shutdown
            .drain(record, self.config.drain_timeout())
            .await?;
        info!(extension_id = %descriptor.id, "Extension disabled");
        Ok(())
    }

    /// Replaces a running extension with a freshly loaded version, rolling
    /// back to the old descriptor if the new one cannot be built.
    pub async fn update(&self, descriptor: &ExtensionDescriptor) -> Result<(), HostError> {
        let id = descriptor.id.as_str();
        let Some(old) = self.registry.get(id) else {
            info!(extension_id = %id, "Update of unregistered extension, enabling instead");
            return self.enable(descriptor).await;
        };

        if let Err(incompatible) = check_version_compatibility(id, old.version(), &descriptor.version) {
            warn!(error = %incompatible, "Proceeding with update");
        }

        let rollback = old.metadata().clone();
        info!(
            extension_id = %id,
            from_version = %old.version(),
            to_version = %descriptor.version,
            "Updating extension"
        );

        if let Err(e) = self.shutdown.drain(old.clone(), self.config.drain_timeout()).await {
            self.run_cleanup(id, CleanupPhase::UpdateFailed).await;
            return Err(LifecycleError::update_failed(id, e.to_string()).into());
        }
        self.registry.unregister(id);
        if let Err(e) = old.cleanup(false).await {
            warn!(extension_id = %id, error = %e, "Cleanup of previous version failed");
        }
        drop(old);

        tokio::time::sleep(self.config.settle_delay()).await;

        let record = match self.build_instance(descriptor) {
            Ok(record) => record,
            Err(e) => {
                error!(extension_id = %id, error = %e, "New version failed to load, rolling back");
                match self.enable(&rollback).await {
                    Ok(()) => info!(extension_id = %id, version = %rollback.version, "Rolled back"),
                    Err(rollback_err) => {
                        error!(extension_id = %id, error = %rollback_err, "Rollback failed")
                    }
                }
                self.run_cleanup(id, CleanupPhase::UpdateFailed).await;
                return Err(LifecycleError::update_failed(id, e.to_string()).into());
            }
        };

        let outcome = match self.registry.register(id, record) {
            Ok(()) => self.registry.start(id).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => {
                self.run_cleanup(id, CleanupPhase::UpdateSucceeded).await;
                info!(extension_id = %id, version = %descriptor.version, "Extension updated");
                Ok(())
            }
            Err(e) => {
                self.run_cleanup(id, CleanupPhase::UpdateFailed).await;
                Err(e.into())
            }
        }
    }

    /// Drains and unregisters an extension. Removing an unknown id succeeds,
    /// and a failed drain falls back to a forced unregister.
    pub async fn remove(&self, descriptor: &ExtensionDescriptor) -> Result<(), HostError> {
        let id = descriptor.id.as_str();
        let Some(record) = self.registry.get(id) else {
            debug!(extension_id = %id, "Remove of unregistered extension ignored");
            return Ok(());
        };

        match self
            .shutdown
            .drain(record.clone(), self.config.drain_timeout())
            .await
        {
            Ok(()) => {
                self.registry.unregister(id);
            }
            Err(e) => {
                warn!(extension_id = %id, error = %e, "Graceful removal failed, forcing");
                self.registry.unregister(id);
                info!(extension_id = %id, "Extension forcibly removed");
            }
        }

        if let Err(e) = record.cleanup(true).await {
            warn!(extension_id = %id, error = %e, "Extension cleanup failed");
        }
        self.run_cleanup(id, CleanupPhase::Removed).await;
        info!(extension_id = %id, "Extension removed");
        Ok(())
    }

    /// Builds and identity-checks a new instance for `descriptor`.
    fn build_instance(&self, descriptor: &ExtensionDescriptor) -> Result<Arc<dyn Extension>, HostError> {
        let id = descriptor.id.as_str();
        if !descriptor.has_entry_point() {
            return Err(InstantiationError::MissingEntryPoint {
                extension_id: id.to_string(),
            }
            .into());
        }

        let context = self.loader.build(descriptor)?;
        let factory = context
            .resolve(&descriptor.entry_point)
            .ok_or_else(|| IsolationLoadError::entry_point_not_found(id, &descriptor.entry_point))?;

        let mut descriptor = descriptor.clone();
        if descriptor.folder_path.as_os_str().is_empty() {
            descriptor.folder_path = context.folder().to_path_buf();
        }

        let args = collect_dependencies(self.resolver.as_ref(), id);
        let instance = self
            .instantiator
            .instantiate(&factory, context, &descriptor, args)?;

        if instance.id() != id {
            return Err(InstantiationError::IdentityMismatch {
                extension_id: id.to_string(),
                reported_id: instance.id().to_string(),
            }
            .into());
        }
        Ok(instance)
    }
}

/// Checks whether moving from `from` to `to` is a compatible version change.
///
/// Identical versions are compatible; otherwise the leading numeric
/// components are compared and a downgrade is reported. Callers log the
/// error and carry on.
pub fn check_version_compatibility(
    extension_id: &str,
    from: &str,
    to: &str,
) -> Result<(), LifecycleError> {
    if from == to {
        return Ok(());
    }

    let incompatible = || LifecycleError::VersionIncompatibility {
        extension_id: extension_id.to_string(),
        from_version: from.to_string(),
        to_version: to.to_string(),
    };

    match (leading_number(from), leading_number(to)) {
        (Some(old), Some(new)) if new >= old => Ok(()),
        _ => Err(incompatible()),
    }
}

fn leading_number(version: &str) -> Option<u64> {
    let version = version.trim().trim_start_matches(['v', 'V']);
    let digits: String = version.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

//! Example echo extension
//!
//! Built as a `cdylib`, dropped into `<root>/echo/` together with
//! its `extension.yaml`, and loaded by the host through the exported
//! registration symbols.

use async_trait::async_trait;
use omnihost_extension_api::{
    ConstructionContext, DependencyValue, Extension, ExtensionDescriptor, ExtensionFactory,
    ExtensionState, ExtensionStatistics, GracefulShutdown, IsolationContext, ParamType,
    RequestCounters,
};
use std::sync::Arc;
use tracing::info;

pub struct EchoExtension {
    state: ExtensionState,
    counters: RequestCounters,
    greeting: String,
}

impl EchoExtension {
    fn build(ctx: &ConstructionContext, greeting: Option<String>) -> Arc<dyn Extension> {
        Arc::new(Self {
            state: ExtensionState::new(ctx.descriptor.clone(), Some(ctx.isolation.clone())),
            counters: RequestCounters::new(),
            greeting: greeting.unwrap_or_else(|| "echo".to_string()),
        })
    }

    /// Echoes `message` back, prefixed with the configured greeting.
    pub fn echo(&self, message: &str) -> Option<String> {
        if !self.state.is_enabled() {
            return None;
        }
        self.counters.begin_request();
        let reply = format!("{}: {}", self.greeting, message);
        self.counters.end_request();
        Some(reply)
    }
}

#[async_trait]
impl Extension for EchoExtension {
    fn metadata(&self) -> &ExtensionDescriptor {
        self.state.descriptor()
    }

    fn isolation_context(&self) -> Option<Arc<IsolationContext>> {
        self.state.isolation()
    }

    async fn start(&self) -> anyhow::Result<()> {
        info!(extension_id = %self.id(), greeting = %self.greeting, "Echo extension started");
        self.state.mark_started();
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        info!(extension_id = %self.id(), "Echo extension stopped");
        self.state.mark_stopped();
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

    fn statistics(&self) -> Option<&dyn ExtensionStatistics> {
        Some(&self.counters)
    }

    fn shutdown_hooks(&self) -> Option<&dyn GracefulShutdown> {
        Some(self)
    }
}

#[async_trait]
impl GracefulShutdown for EchoExtension {
    async fn close_all_connections(&self) -> anyhow::Result<()> {
        self.counters.reset_connections();
        Ok(())
    }
}

omnihost_extension_api::export_extensions!(ExtensionFactory::new("echo")
    .constructor(vec![ParamType::optional(ParamType::Text)], |ctx, args| {
        let greeting = args
            .into_iter()
            .next()
            .and_then(|v| v.as_str().map(str::to_string));
        Ok(EchoExtension::build(ctx, greeting))
    })
    .constructor(vec![], |ctx, _: Vec<DependencyValue>| Ok(EchoExtension::build(ctx, None))));

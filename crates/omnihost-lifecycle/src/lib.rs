//! # OmniHost Lifecycle
//!
//! Runtime side of the extension host: discovery, isolated loading, dynamic
//! instantiation, the registry, lifecycle transitions and graceful shutdown.
//!
//! ## Example
//!
//! ```no_run
//! use omnihost_core::HostConfig;
//! use omnihost_lifecycle::ExtensionHost;
//! use std::time::Duration;
//!
//! # async fn run() {
//! let host = ExtensionHost::new(HostConfig::default());
//! host.start().await;
//!
//! let result = host
//!     .operations()
//!     .update_extensions(&["http-echo"], Duration::from_secs(30))
//!     .await;
//! println!("updated: {:?}, failed: {:?}", result.succeeded, result.failed);
//!
//! host.shutdown().await;
//! # }
//! ```

pub mod cleanup;
pub mod dependencies;
pub mod discovery;
pub mod handler;
pub mod host;
pub mod instantiator;
pub mod isolation;
pub mod operations;
pub mod protocol;
pub mod registry;
pub mod shutdown;
pub mod watcher;

pub use cleanup::{CleanupHook, CleanupPhase};
pub use dependencies::{DependencyResolver, StaticDependencyResolver};
pub use discovery::{ExtensionDiscovery, ManifestReader, YamlManifestReader};
pub use handler::{check_version_compatibility, LifecycleHandler};
pub use host::{ExtensionHost, ExtensionHostBuilder};
pub use instantiator::{DynamicInstantiator, SyntheticExtension};
pub use isolation::IsolationLoader;
pub use operations::{ExtensionStatus, LifecycleOperations};
pub use protocol::ProtocolGateway;
pub use registry::ExtensionRegistry;
pub use shutdown::{DrainReport, ShutdownManager};
pub use watcher::{reconcile, HotReloadWatcher};

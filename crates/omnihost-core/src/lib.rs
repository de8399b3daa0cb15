//! # OmniHost Core
//!
//! Core types, error handling, and configuration for the OmniHost extension
//! runtime.
//!
//! - **Types**: `ExtensionDescriptor`, `ExtensionEvent`, `ShutdownStatus`,
//!   `OperationResult` and the `ProtocolFamily` naming heuristic.
//! - **Errors**: the discovery / isolation / instantiation / lifecycle /
//!   shutdown taxonomy, all serializable for admin responses.
//! - **Configuration**: YAML files with `OMNIHOST__*` environment overrides
//!   and validation.
//! - **Logging**: subscriber bootstrap driven by the logging section.
//!
//! ## Example
//!
//! ```
//! use omnihost_core::types::{ExtensionDescriptor, ExtensionEvent, ExtensionChange};
//!
//! let descriptor = ExtensionDescriptor::builder("echo")
//!     .version("1.0.0")
//!     .entry_point("echo")
//!     .build();
//!
//! let event = ExtensionEvent::enable(descriptor);
//! assert_eq!(event.change, ExtensionChange::Enable);
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types for convenience
pub use config::HostConfig;
pub use error::{
    ConfigError, DiscoveryError, HostError, InstantiationError, IsolationLoadError,
    LifecycleError, Result, ShutdownError,
};
pub use types::{
    ExtensionChange, ExtensionDescriptor, ExtensionEvent, OperationResult, ProtocolFamily,
    ShutdownStatus,
};

//! Error types for the OmniHost extension runtime.
//!
//! The taxonomy mirrors the phases an extension goes through: discovery on
//! disk, isolated loading of its artifacts, instantiation of its entry point,
//! lifecycle transitions (start/stop/update) and graceful shutdown. All errors
//! implement `std::error::Error` and are serializable for admin responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using HostError as the error type.
pub type Result<T> = std::result::Result<T, HostError>;

/// Top-level error type for all OmniHost operations.
///
/// Single-extension operations surface one of these to their direct caller.
/// Batch operations never return them directly; they capture the rendered
/// message per extension id instead.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum HostError {
    /// Folder or manifest problems found while scanning
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Primary artifact missing, ambiguous or not loadable
    #[error("Isolation load error: {0}")]
    IsolationLoad(#[from] IsolationLoadError),

    /// No usable construction path for an entry point
    #[error("Instantiation error: {0}")]
    Instantiation(#[from] InstantiationError),

    /// A lifecycle transition failed
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Graceful shutdown problems
    #[error("Shutdown error: {0}")]
    Shutdown(#[from] ShutdownError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostError {
    /// Returns the extension id this error is about, when it carries one.
    pub fn extension_id(&self) -> Option<&str> {
        match self {
            HostError::Discovery(e) => e.extension_id(),
            HostError::IsolationLoad(e) => Some(e.extension_id()),
            HostError::Instantiation(e) => Some(e.extension_id()),
            HostError::Lifecycle(e) => e.extension_id(),
            HostError::Shutdown(e) => e.extension_id(),
            _ => None,
        }
    }

    /// Returns true if the error means the extension is simply not registered.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::Lifecycle(LifecycleError::NotFound { .. }))
    }
}

/// Errors raised while scanning extension folders.
///
/// These never abort a scan; the offending folder is skipped and logged.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum DiscoveryError {
    /// Extension root directory could not be read
    #[error("Extension root not readable: {path}: {reason}")]
    RootUnreadable { path: String, reason: String },

    /// No folder for this id under any known root
    #[error("Extension folder for '{extension_id}' not found (searched: {searched})")]
    FolderNotFound {
        extension_id: String,
        searched: String,
    },

    /// Manifest missing from the folder
    #[error("Manifest not found in {folder}")]
    ManifestNotFound { folder: String },

    /// Manifest present but not parseable
    #[error("Malformed manifest in {folder}: {reason}")]
    MalformedManifest { folder: String, reason: String },

    /// Folder name and declared id disagree
    #[error("Folder name '{folder_name}' does not match declared id '{declared_id}'")]
    IdMismatch {
        folder_name: String,
        declared_id: String,
    },
}

impl DiscoveryError {
    /// Creates a folder not found error.
    pub fn folder_not_found(extension_id: impl Into<String>, searched: impl Into<String>) -> Self {
        Self::FolderNotFound {
            extension_id: extension_id.into(),
            searched: searched.into(),
        }
    }

    /// Creates a malformed manifest error.
    pub fn malformed(folder: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedManifest {
            folder: folder.into(),
            reason: reason.into(),
        }
    }

    fn extension_id(&self) -> Option<&str> {
        match self {
            DiscoveryError::FolderNotFound { extension_id, .. } => Some(extension_id),
            DiscoveryError::IdMismatch { declared_id, .. } => Some(declared_id),
            _ => None,
        }
    }
}

/// Errors building an extension's isolation context.
///
/// Fails the single Enable/Update it belongs to and nothing else.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum IsolationLoadError {
    /// Extension folder could not be located
    #[error("[{extension_id}] {source}")]
    Discovery {
        extension_id: String,
        source: DiscoveryError,
    },

    /// No artifact carries the extension id in its name
    #[error("[{extension_id}] No primary artifact in {folder}")]
    PrimaryArtifactMissing {
        extension_id: String,
        folder: String,
    },

    /// More than one artifact carries the extension id in its name
    #[error("[{extension_id}] Ambiguous primary artifact in {folder}: {candidates:?}")]
    PrimaryArtifactAmbiguous {
        extension_id: String,
        folder: String,
        candidates: Vec<String>,
    },

    /// A native library failed to open or register
    #[error("[{extension_id}] Failed to load library {path}: {reason}")]
    LibraryLoadFailed {
        extension_id: String,
        path: String,
        reason: String,
    },

    /// Entry point not found in the context or the host
    #[error("[{extension_id}] Entry point '{entry_point}' is not registered")]
    EntryPointNotFound {
        extension_id: String,
        entry_point: String,
    },

    /// Artifact could not be read
    #[error("[{extension_id}] Failed to read {path}: {reason}")]
    ArtifactUnreadable {
        extension_id: String,
        path: String,
        reason: String,
    },
}

impl IsolationLoadError {
    /// Returns the extension id.
    pub fn extension_id(&self) -> &str {
        match self {
            IsolationLoadError::Discovery { extension_id, .. }
            | IsolationLoadError::PrimaryArtifactMissing { extension_id, .. }
            | IsolationLoadError::PrimaryArtifactAmbiguous { extension_id, .. }
            | IsolationLoadError::LibraryLoadFailed { extension_id, .. }
            | IsolationLoadError::EntryPointNotFound { extension_id, .. }
            | IsolationLoadError::ArtifactUnreadable { extension_id, .. } => extension_id,
        }
    }

    /// Creates an entry point not found error.
    pub fn entry_point_not_found(
        extension_id: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self::EntryPointNotFound {
            extension_id: extension_id.into(),
            entry_point: entry_point.into(),
        }
    }
}

/// Errors turning an entry point into a live instance.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum InstantiationError {
    /// Every construction tier failed and the synthetic fallback is disabled
    #[error("[{extension_id}] No usable constructor for '{entry_point}': {reason}")]
    NoUsableConstructor {
        extension_id: String,
        entry_point: String,
        reason: String,
    },

    /// The instance does not identify as the extension it was built for
    #[error("[{extension_id}] Instance reports id '{reported_id}'")]
    IdentityMismatch {
        extension_id: String,
        reported_id: String,
    },

    /// Descriptor has no entry point to instantiate
    #[error("[{extension_id}] Descriptor has no entry point")]
    MissingEntryPoint { extension_id: String },
}

impl InstantiationError {
    /// Returns the extension id.
    pub fn extension_id(&self) -> &str {
        match self {
            InstantiationError::NoUsableConstructor { extension_id, .. }
            | InstantiationError::IdentityMismatch { extension_id, .. }
            | InstantiationError::MissingEntryPoint { extension_id } => extension_id,
        }
    }

    /// Creates a no usable constructor error.
    pub fn no_constructor(
        extension_id: impl Into<String>,
        entry_point: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::NoUsableConstructor {
            extension_id: extension_id.into(),
            entry_point: entry_point.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from lifecycle transitions.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum LifecycleError {
    /// Extension is not registered
    #[error("Extension not registered: {extension_id}")]
    NotFound { extension_id: String },

    /// Registration rejected before touching the registry
    #[error("Invalid registration: {reason}")]
    InvalidRegistration { reason: String },

    /// start() returned an error
    #[error("[{extension_id}] Start failed: {reason}")]
    StartFailed {
        extension_id: String,
        reason: String,
    },

    /// stop() returned an error
    #[error("[{extension_id}] Stop failed: {reason}")]
    StopFailed {
        extension_id: String,
        reason: String,
    },

    /// Update aborted; rollback was attempted
    #[error("[{extension_id}] Update failed: {reason}")]
    UpdateFailed {
        extension_id: String,
        reason: String,
    },

    /// Operation exceeded its deadline
    #[error("[{extension_id}] {operation} timed out after {timeout_ms}ms")]
    Timeout {
        extension_id: String,
        operation: String,
        timeout_ms: u64,
    },

    /// Old and new versions are not considered compatible (non-fatal)
    #[error("[{extension_id}] Version {from_version} -> {to_version} is not compatible")]
    VersionIncompatibility {
        extension_id: String,
        from_version: String,
        to_version: String,
    },

    /// Background task panicked or was cancelled
    #[error("[{extension_id}] Lifecycle task failed: {reason}")]
    TaskFailed {
        extension_id: String,
        reason: String,
    },
}

impl LifecycleError {
    /// Creates a not found error.
    pub fn not_found(extension_id: impl Into<String>) -> Self {
        Self::NotFound {
            extension_id: extension_id.into(),
        }
    }

    /// Creates a start failed error.
    pub fn start_failed(extension_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StartFailed {
            extension_id: extension_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a stop failed error.
    pub fn stop_failed(extension_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            extension_id: extension_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an update failed error.
    pub fn update_failed(extension_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpdateFailed {
            extension_id: extension_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(
        extension_id: impl Into<String>,
        operation: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self::Timeout {
            extension_id: extension_id.into(),
            operation: operation.into(),
            timeout_ms,
        }
    }

    fn extension_id(&self) -> Option<&str> {
        match self {
            LifecycleError::InvalidRegistration { .. } => None,
            LifecycleError::NotFound { extension_id }
            | LifecycleError::StartFailed { extension_id, .. }
            | LifecycleError::StopFailed { extension_id, .. }
            | LifecycleError::UpdateFailed { extension_id, .. }
            | LifecycleError::Timeout { extension_id, .. }
            | LifecycleError::VersionIncompatibility { extension_id, .. }
            | LifecycleError::TaskFailed { extension_id, .. } => Some(extension_id),
        }
    }
}

/// Graceful shutdown problems.
///
/// Apart from the drain-all deadline these are logged and downgraded to a
/// forced stop rather than returned.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ShutdownError {
    /// Pending work did not reach zero before the deadline
    #[error("[{extension_id}] Drain timed out after {timeout_ms}ms with {pending} pending requests")]
    Timeout {
        extension_id: String,
        timeout_ms: u64,
        pending: u64,
    },

    /// A shutdown hook failed
    #[error("[{extension_id}] Shutdown hook '{hook}' failed: {reason}")]
    HookFailed {
        extension_id: String,
        hook: String,
        reason: String,
    },

    /// Not every drain finished before the aggregate deadline
    #[error("Drain of all extensions timed out after {timeout_ms}ms")]
    DrainAllTimeout { timeout_ms: u64 },
}

impl ShutdownError {
    /// Creates a hook failed error.
    pub fn hook_failed(
        extension_id: impl Into<String>,
        hook: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::HookFailed {
            extension_id: extension_id.into(),
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    fn extension_id(&self) -> Option<&str> {
        match self {
            ShutdownError::Timeout { extension_id, .. }
            | ShutdownError::HookFailed { extension_id, .. } => Some(extension_id),
            ShutdownError::DrainAllTimeout { .. } => None,
        }
    }
}

/// Errors related to configuration.
///
/// These errors occur when loading, parsing, or validating configuration files.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

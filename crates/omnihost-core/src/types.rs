//! Core types for the OmniHost extension runtime.
//!
//! These are plain data records handed between discovery, the lifecycle
//! handler and the batch operations. None of them hold live extension state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Immutable metadata describing one extension folder.
///
/// Produced by discovery from the on-disk manifest. The folder name must equal
/// `id`; discovery rejects the descriptor otherwise.
///
/// # Examples
///
/// ```
/// use omnihost_core::types::ExtensionDescriptor;
///
/// let descriptor = ExtensionDescriptor::builder("echo")
///     .version("1.2.0")
///     .entry_point("echo::EchoService")
///     .priority(10)
///     .build();
///
/// assert_eq!(descriptor.id, "echo");
/// assert!(descriptor.has_entry_point());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    /// Unique identifier, equal to the folder name
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Semver-like version string
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional author
    #[serde(default)]
    pub author: Option<String>,

    /// Drain priority (higher drains first)
    #[serde(default)]
    pub priority: i32,

    /// Start priority
    #[serde(default, alias = "startPriority")]
    pub start_priority: i32,

    /// Reference to the implementation the instantiator should build
    #[serde(default, alias = "entryPoint")]
    pub entry_point: String,

    /// Folder the descriptor was read from
    #[serde(skip)]
    pub folder_path: PathBuf,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl ExtensionDescriptor {
    /// Creates a builder for a descriptor with the given id.
    pub fn builder(id: impl Into<String>) -> ExtensionDescriptorBuilder {
        ExtensionDescriptorBuilder::new(id)
    }

    /// Derives a minimal descriptor from an id alone.
    ///
    /// The entry point defaults to the id itself and the folder to
    /// `<root>/<id>`.
    pub fn minimal(id: impl Into<String>, root: &Path) -> Self {
        let id = id.into();
        Self::builder(id.clone())
            .entry_point(id.clone())
            .folder_path(root.join(&id))
            .build()
    }

    /// Returns true if an entry point reference is present.
    pub fn has_entry_point(&self) -> bool {
        !self.entry_point.trim().is_empty()
    }

    /// Returns the display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Builder for [`ExtensionDescriptor`].
#[derive(Debug)]
pub struct ExtensionDescriptorBuilder {
    descriptor: ExtensionDescriptor,
}

impl ExtensionDescriptorBuilder {
    fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            descriptor: ExtensionDescriptor {
                name: id.clone(),
                id,
                version: default_version(),
                author: None,
                priority: 0,
                start_priority: 0,
                entry_point: String::new(),
                folder_path: PathBuf::new(),
            },
        }
    }

    /// Sets the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = name.into();
        self
    }

    /// Sets the version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.descriptor.version = version.into();
        self
    }

    /// Sets the author.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.descriptor.author = Some(author.into());
        self
    }

    /// Sets the drain priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.descriptor.priority = priority;
        self
    }

    /// Sets the start priority.
    pub fn start_priority(mut self, start_priority: i32) -> Self {
        self.descriptor.start_priority = start_priority;
        self
    }

    /// Sets the entry point reference.
    pub fn entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.descriptor.entry_point = entry_point.into();
        self
    }

    /// Sets the folder path.
    pub fn folder_path(mut self, folder_path: impl Into<PathBuf>) -> Self {
        self.descriptor.folder_path = folder_path.into();
        self
    }

    /// Builds the descriptor.
    pub fn build(self) -> ExtensionDescriptor {
        self.descriptor
    }
}

/// Kind of lifecycle change an event requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionChange {
    /// Load, instantiate, register and start
    Enable,
    /// Drain and stop, keep registered
    Disable,
    /// Replace the running instance with a new version
    Update,
    /// Drain, unregister and clean up
    Remove,
}

impl fmt::Display for ExtensionChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionChange::Enable => write!(f, "enable"),
            ExtensionChange::Disable => write!(f, "disable"),
            ExtensionChange::Update => write!(f, "update"),
            ExtensionChange::Remove => write!(f, "remove"),
        }
    }
}

/// A request to move one extension through the lifecycle.
///
/// Consumed exactly once by the lifecycle handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionEvent {
    pub change: ExtensionChange,
    pub descriptor: ExtensionDescriptor,
    pub folder_path: PathBuf,
}

impl ExtensionEvent {
    /// Creates an event; the folder path is taken from the descriptor.
    pub fn new(change: ExtensionChange, descriptor: ExtensionDescriptor) -> Self {
        let folder_path = descriptor.folder_path.clone();
        Self {
            change,
            descriptor,
            folder_path,
        }
    }

    pub fn enable(descriptor: ExtensionDescriptor) -> Self {
        Self::new(ExtensionChange::Enable, descriptor)
    }

    pub fn disable(descriptor: ExtensionDescriptor) -> Self {
        Self::new(ExtensionChange::Disable, descriptor)
    }

    pub fn update(descriptor: ExtensionDescriptor) -> Self {
        Self::new(ExtensionChange::Update, descriptor)
    }

    pub fn remove(descriptor: ExtensionDescriptor) -> Self {
        Self::new(ExtensionChange::Remove, descriptor)
    }

    /// Returns the extension id.
    pub fn extension_id(&self) -> &str {
        &self.descriptor.id
    }
}

/// Protocol family an extension serves, inferred from its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    Http,
    Mqtt,
    Tcp,
    Udp,
    WebSocket,
    Custom,
}

impl ProtocolFamily {
    /// Infers the family from an extension id by naming convention.
    ///
    /// `websocket`/`ws-` is checked before `http` and `tcp` so that ids such
    /// as `websocket-http-bridge` land on the WebSocket family.
    pub fn from_extension_id(id: &str) -> Option<Self> {
        let id = id.to_ascii_lowercase();
        if id.contains("websocket") || id.starts_with("ws-") || id.ends_with("-ws") {
            Some(ProtocolFamily::WebSocket)
        } else if id.contains("mqtt") {
            Some(ProtocolFamily::Mqtt)
        } else if id.contains("http") {
            Some(ProtocolFamily::Http)
        } else if id.contains("tcp") {
            Some(ProtocolFamily::Tcp)
        } else if id.contains("udp") {
            Some(ProtocolFamily::Udp)
        } else if id.contains("custom") {
            Some(ProtocolFamily::Custom)
        } else {
            None
        }
    }

    /// Returns true if the family serves request/response traffic.
    pub fn is_request_based(&self) -> bool {
        matches!(self, ProtocolFamily::Http)
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFamily::Http => write!(f, "HTTP"),
            ProtocolFamily::Mqtt => write!(f, "MQTT"),
            ProtocolFamily::Tcp => write!(f, "TCP"),
            ProtocolFamily::Udp => write!(f, "UDP"),
            ProtocolFamily::WebSocket => write!(f, "WebSocket"),
            ProtocolFamily::Custom => write!(f, "Custom"),
        }
    }
}

/// Read-only projection of whether an extension can be stopped right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownStatus {
    pub extension_id: String,
    pub can_shutdown_safely: bool,
    pub active_requests: u64,
    pub active_connections: u64,
}

/// Aggregated outcome of a batch lifecycle call.
///
/// An id is never in both sets; recording a failure for an id that already
/// succeeded moves it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub failure_reason: BTreeMap<String, String>,
}

impl OperationResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a success for `id`.
    pub fn record_success(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.failed.remove(&id);
        self.failure_reason.remove(&id);
        self.succeeded.insert(id);
    }

    /// Records a failure for `id` with its reason.
    pub fn record_failure(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        let id = id.into();
        self.succeeded.remove(&id);
        self.failure_reason.insert(id.clone(), reason.into());
        self.failed.insert(id);
    }

    /// Returns true if no id failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns the number of ids processed.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Returns the failure reason for `id`, if it failed.
    pub fn reason(&self, id: &str) -> Option<&str> {
        self.failure_reason.get(id).map(|s| s.as_str())
    }
}

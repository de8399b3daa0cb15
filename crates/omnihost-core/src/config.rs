//! Configuration management for the OmniHost extension runtime.
//!
//! This module provides a configuration system that supports:
//! - Loading from YAML files
//! - Environment variable overrides (`OMNIHOST__*`)
//! - Validation of all settings
//! - Extension roots, lifecycle timings and logging configuration

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Main host configuration.
///
/// # Examples
///
/// ```no_run
/// use omnihost_core::config::HostConfig;
///
/// let config = HostConfig::from_file("config/omnihost.yaml").unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Where extensions live on disk and how folders are laid out
    #[serde(default)]
    pub extensions: ExtensionsConfig,

    /// Timings and policies for lifecycle transitions
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering
    /// `OMNIHOST__SECTION__KEY` environment variables over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("OMNIHOST")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self) -> Result<()> {
        self.extensions.validate()?;
        self.lifecycle.validate()?;
        self.logging.parse_level()?;
        Ok(())
    }
}

/// Extension folder layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    /// Primary extension root, scanned by discovery
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Build-output root, probed after `root`
    #[serde(default = "default_build_output_root")]
    pub build_output_root: PathBuf,

    /// Library root, probed last
    #[serde(default = "default_library_root")]
    pub library_root: PathBuf,

    /// Manifest file name inside each extension folder
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Marker file whose presence means "load as disabled"
    #[serde(default = "default_disable_marker")]
    pub disable_marker: String,

    /// File extensions counted as artifacts
    #[serde(default = "default_artifact_extensions")]
    pub artifact_extensions: Vec<String>,

    /// Whether native libraries are opened and asked to register factories
    #[serde(default = "default_true")]
    pub load_native_artifacts: bool,
}

fn default_root() -> PathBuf {
    PathBuf::from("extensions")
}

fn default_build_output_root() -> PathBuf {
    PathBuf::from("target/extensions")
}

fn default_library_root() -> PathBuf {
    PathBuf::from("lib/extensions")
}

fn default_manifest_file() -> String {
    "extension.yaml".to_string()
}

fn default_disable_marker() -> String {
    ".disabled".to_string()
}

fn default_artifact_extensions() -> Vec<String> {
    ["so", "dylib", "dll", "wasm", "pkg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            build_output_root: default_build_output_root(),
            library_root: default_library_root(),
            manifest_file: default_manifest_file(),
            disable_marker: default_disable_marker(),
            artifact_extensions: default_artifact_extensions(),
            load_native_artifacts: true,
        }
    }
}

impl ExtensionsConfig {
    /// Creates a layout rooted at `root`, with the build-output and library
    /// roots as siblings (`<root>-build`, `<root>-lib`) so scans of `root`
    /// never see them.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "extensions".to_string());
        Self {
            build_output_root: root.with_file_name(format!("{}-build", name)),
            library_root: root.with_file_name(format!("{}-lib", name)),
            root,
            ..Default::default()
        }
    }

    /// Returns the roots in probe order.
    pub fn search_roots(&self) -> [&Path; 3] {
        [&self.root, &self.build_output_root, &self.library_root]
    }

    /// Returns true if `path` has one of the configured artifact extensions.
    pub fn is_artifact(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.artifact_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Validates the folder layout.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value("extensions.root", "cannot be empty").into());
        }
        if self.manifest_file.trim().is_empty() {
            return Err(
                ConfigError::invalid_value("extensions.manifest_file", "cannot be empty").into(),
            );
        }
        if self.disable_marker.trim().is_empty() {
            return Err(
                ConfigError::invalid_value("extensions.disable_marker", "cannot be empty").into(),
            );
        }
        if self.artifact_extensions.is_empty() {
            return Err(ConfigError::invalid_value(
                "extensions.artifact_extensions",
                "at least one artifact extension is required",
            )
            .into());
        }
        Ok(())
    }
}

/// Lifecycle timings and policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Pause between unregistering an old version and loading the new one
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Upper bound on waiting for pending requests during a drain
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,

    /// Interval between pending-request polls during a drain
    #[serde(default = "default_drain_poll_interval")]
    pub drain_poll_interval_ms: u64,

    /// Per-id deadline for batch operations
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// Build an inert placeholder when no constructor matches
    #[serde(default = "default_true")]
    pub synthetic_fallback: bool,

    /// Periodically reconcile on-disk state with the registry
    #[serde(default)]
    pub hot_reload: bool,

    /// Interval between hot-reload scans
    #[serde(default = "default_hot_reload_interval")]
    pub hot_reload_interval_ms: u64,
}

fn default_settle_delay() -> u64 {
    500
}

fn default_drain_timeout() -> u64 {
    30_000
}

fn default_drain_poll_interval() -> u64 {
    100
}

fn default_operation_timeout() -> u64 {
    60_000
}

fn default_hot_reload_interval() -> u64 {
    5_000
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            drain_timeout_ms: default_drain_timeout(),
            drain_poll_interval_ms: default_drain_poll_interval(),
            operation_timeout_ms: default_operation_timeout(),
            synthetic_fallback: true,
            hot_reload: false,
            hot_reload_interval_ms: default_hot_reload_interval(),
        }
    }
}

impl LifecycleConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn hot_reload_interval(&self) -> Duration {
        Duration::from_millis(self.hot_reload_interval_ms)
    }

    /// Validates timings.
    pub fn validate(&self) -> Result<()> {
        if self.drain_poll_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "lifecycle.drain_poll_interval_ms",
                "must be greater than zero",
            )
            .into());
        }
        if self.drain_poll_interval_ms > self.drain_timeout_ms {
            return Err(ConfigError::invalid_value(
                "lifecycle.drain_poll_interval_ms",
                format!(
                    "{}ms exceeds drain timeout of {}ms",
                    self.drain_poll_interval_ms, self.drain_timeout_ms
                ),
            )
            .into());
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "lifecycle.operation_timeout_ms",
                "must be greater than zero",
            )
            .into());
        }
        if self.hot_reload && self.hot_reload_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "lifecycle.hot_reload_interval_ms",
                "must be greater than zero when hot reload is enabled",
            )
            .into());
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file_line: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::invalid_value("logging.level", format!("Invalid log level: {}", self.level))
                .into()
        })
    }

    /// Builds an env-filter directive string, e.g. `info,omnihost_lifecycle=debug`.
    pub fn filter_directives(&self) -> String {
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort();
        std::iter::once(self.level.clone())
            .chain(
                modules
                    .into_iter()
                    .map(|(module, level)| format!("{}={}", module, level)),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

//! Extension discovery.
//!
//! Scans an extension root, reads one manifest per sub-folder and turns the
//! on-disk state into Enable/Disable events. Bad folders are skipped with a
//! warning; an unreadable root yields no events.

use omnihost_core::config::ExtensionsConfig;
use omnihost_core::error::DiscoveryError;
use omnihost_core::types::{ExtensionDescriptor, ExtensionEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads a descriptor from an extension folder.
pub trait ManifestReader: Send + Sync {
    fn read(&self, folder: &Path) -> Result<ExtensionDescriptor, DiscoveryError>;
}

/// Reads `<folder>/<manifest_file>` as YAML (JSON manifests parse as well).
#[derive(Debug, Clone)]
pub struct YamlManifestReader {
    manifest_file: String,
}

impl YamlManifestReader {
    pub fn new(manifest_file: impl Into<String>) -> Self {
        Self {
            manifest_file: manifest_file.into(),
        }
    }
}

impl ManifestReader for YamlManifestReader {
    fn read(&self, folder: &Path) -> Result<ExtensionDescriptor, DiscoveryError> {
        let manifest_path = folder.join(&self.manifest_file);
        if !manifest_path.is_file() {
            return Err(DiscoveryError::ManifestNotFound {
                folder: folder.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&manifest_path)
            .map_err(|e| DiscoveryError::malformed(folder.display().to_string(), e.to_string()))?;

        let mut descriptor: ExtensionDescriptor = serde_yaml::from_str(&contents)
            .map_err(|e| DiscoveryError::malformed(folder.display().to_string(), e.to_string()))?;

        if descriptor.id.trim().is_empty() {
            return Err(DiscoveryError::malformed(
                folder.display().to_string(),
                "manifest id is empty",
            ));
        }
        if descriptor.name.is_empty() {
            descriptor.name = descriptor.id.clone();
        }
        descriptor.folder_path = folder.to_path_buf();
        Ok(descriptor)
    }
}

/// Filesystem discovery over the configured extension roots.
pub struct ExtensionDiscovery {
    config: ExtensionsConfig,
    reader: Arc<dyn ManifestReader>,
}

impl ExtensionDiscovery {
    /// Creates discovery with the YAML manifest reader.
    pub fn new(config: ExtensionsConfig) -> Self {
        let reader = Arc::new(YamlManifestReader::new(config.manifest_file.clone()));
        Self { config, reader }
    }

    /// Creates discovery with a custom manifest reader.
    pub fn with_reader(config: ExtensionsConfig, reader: Arc<dyn ManifestReader>) -> Self {
        Self { config, reader }
    }

    pub fn config(&self) -> &ExtensionsConfig {
        &self.config
    }

    /// Scans the extension root and emits one event per valid folder.
    ///
    /// Order follows directory iteration and is not stable across platforms.
    pub fn scan(&self) -> Vec<ExtensionEvent> {
        self.scan_root(&self.config.root)
    }

    /// Scans an arbitrary root with this discovery's layout rules.
    pub fn scan_root(&self, root: &Path) -> Vec<ExtensionEvent> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                let err = DiscoveryError::RootUnreadable {
                    path: root.display().to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Extension scan skipped");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for entry in entries.flatten() {
            let folder = entry.path();
            if !folder.is_dir() {
                continue;
            }

            let descriptor = match self.read_folder(&folder) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(folder = %folder.display(), error = %e, "Skipping extension folder");
                    continue;
                }
            };

            let event = if self.is_disabled(&folder) {
                debug!(extension_id = %descriptor.id, "Disable marker present");
                ExtensionEvent::disable(descriptor)
            } else {
                ExtensionEvent::enable(descriptor)
            };
            events.push(event);
        }

        info!(root = %root.display(), count = events.len(), "Extension scan complete");
        events
    }

    /// Reads and validates the descriptor of one folder.
    pub fn read_folder(&self, folder: &Path) -> Result<ExtensionDescriptor, DiscoveryError> {
        let descriptor = self.reader.read(folder)?;

        let folder_name = folder
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if folder_name != descriptor.id {
            return Err(DiscoveryError::IdMismatch {
                folder_name: folder_name.to_string(),
                declared_id: descriptor.id,
            });
        }

        Ok(descriptor)
    }

    /// Returns true if the folder carries the disable marker.
    pub fn is_disabled(&self, folder: &Path) -> bool {
        folder.join(&self.config.disable_marker).exists()
    }

    /// Finds the folder for `id` under the known roots, first match wins.
    pub fn locate_folder(&self, id: &str) -> Result<PathBuf, DiscoveryError> {
        locate_extension_folder(&self.config, id)
    }

    /// Reads the descriptor for `id` from whichever root holds it.
    pub fn descriptor_for(&self, id: &str) -> Result<ExtensionDescriptor, DiscoveryError> {
        let folder = self.locate_folder(id)?;
        self.read_folder(&folder)
    }
}

/// Probes `root`, `build_output_root` and `library_root` for `<root>/<id>`.
pub fn locate_extension_folder(
    config: &ExtensionsConfig,
    id: &str,
) -> Result<PathBuf, DiscoveryError> {
    let roots = config.search_roots();
    for root in roots.iter() {
        let candidate = root.join(id);
        if candidate.is_dir() {
            return Ok(candidate);
        }
    }

    let searched = roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(DiscoveryError::folder_not_found(id, searched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnihost_core::types::ExtensionChange;
    use std::fs;

    fn write_manifest(root: &Path, folder: &str, id: &str, version: &str) -> PathBuf {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("extension.yaml"),
            format!("id: {}\nversion: \"{}\"\nentry_point: {}\n", id, version, id),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_scan_emits_enable_and_disable() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "echo", "echo", "1.0.0");
        let paused = write_manifest(tmp.path(), "paused", "paused", "0.3.0");
        fs::write(paused.join(".disabled"), "").unwrap();

        let discovery = ExtensionDiscovery::new(ExtensionsConfig::rooted_at(tmp.path()));
        let mut events = discovery.scan();
        events.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].change, ExtensionChange::Enable);
        assert_eq!(events[0].descriptor.version, "1.0.0");
        assert_eq!(events[0].folder_path, tmp.path().join("echo"));
        assert_eq!(events[1].change, ExtensionChange::Disable);
    }

    #[test]
    fn test_scan_skips_mismatched_and_broken_folders() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "echo", "echo", "1.0.0");
        write_manifest(tmp.path(), "renamed", "original", "1.0.0");
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        let broken = tmp.path().join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("extension.yaml"), "id: [unclosed").unwrap();
        fs::write(tmp.path().join("stray-file.txt"), "not a folder").unwrap();

        let discovery = ExtensionDiscovery::new(ExtensionsConfig::rooted_at(tmp.path()));
        let events = discovery.scan();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].descriptor.id, "echo");
    }

    #[test]
    fn test_unreadable_root_yields_nothing() {
        let discovery =
            ExtensionDiscovery::new(ExtensionsConfig::rooted_at("/definitely/not/a/root"));
        assert!(discovery.scan().is_empty());
    }

    #[test]
    fn test_locate_probes_roots_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ExtensionsConfig::rooted_at(tmp.path().join("extensions"));
        fs::create_dir_all(&config.root).unwrap();
        fs::create_dir_all(config.library_root.join("echo")).unwrap();
        fs::create_dir_all(config.build_output_root.join("echo")).unwrap();

        let found = locate_extension_folder(&config, "echo").unwrap();
        assert_eq!(found, config.build_output_root.join("echo"));
        assert!(ExtensionDiscovery::new(config.clone()).scan().is_empty());

        let missing = locate_extension_folder(&config, "ghost");
        assert!(matches!(
            missing,
            Err(DiscoveryError::FolderNotFound { .. })
        ));
    }

    #[test]
    fn test_manifest_name_defaults_to_id() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_manifest(tmp.path(), "echo", "echo", "1.0.0");
        let descriptor = YamlManifestReader::new("extension.yaml").read(&dir).unwrap();
        assert_eq!(descriptor.name, "echo");
        assert_eq!(descriptor.folder_path, dir);
    }
}

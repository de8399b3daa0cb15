//! Builds per-extension isolation contexts from on-disk artifacts.

use libloading::{Library, Symbol};
use omnihost_core::config::ExtensionsConfig;
use omnihost_core::error::IsolationLoadError;
use omnihost_core::types::ExtensionDescriptor;
use omnihost_extension_api::{
    AbiVersionFn, FactoryTable, IsolationContext, RegisterExtensionsFn, ABI_VERSION_SYMBOL,
    EXTENSION_ABI_VERSION, REGISTER_SYMBOL,
};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::discovery::locate_extension_folder;

/// Resolves an extension's folder and artifacts into an [`IsolationContext`].
pub struct IsolationLoader {
    config: ExtensionsConfig,
    host: Arc<FactoryTable>,
}

impl IsolationLoader {
    /// `host` is the parent table every context falls back to.
    pub fn new(config: ExtensionsConfig, host: Arc<FactoryTable>) -> Self {
        Self { config, host }
    }

    pub fn host_factories(&self) -> &Arc<FactoryTable> {
        &self.host
    }

    /// Builds a fresh context for the extension `descriptor` names.
    pub fn build(&self, descriptor: &ExtensionDescriptor) -> Result<Arc<IsolationContext>, IsolationLoadError> {
        let extension_id = descriptor.id.as_str();
        let folder = locate_extension_folder(&self.config, extension_id).map_err(|source| {
            IsolationLoadError::Discovery {
                extension_id: extension_id.to_string(),
                source,
            }
        })?;

        let artifacts = self.collect_artifacts(extension_id, &folder)?;
        let fingerprint = fingerprint(extension_id, &artifacts[0])?;

        let context = IsolationContext::new(extension_id, &folder, artifacts, self.host.clone())
            .with_fingerprint(fingerprint)
            .with_source_version(&descriptor.version);

        if self.config.load_native_artifacts {
            load_native_artifacts(&context)?;
        }

        info!(
            extension_id = %extension_id,
            folder = %folder.display(),
            artifacts = context.artifacts().len(),
            libraries = context.loaded_library_count(),
            "Isolation context built"
        );
        Ok(Arc::new(context))
    }

    /// Lists artifacts in `folder`, primary first, deduplicated by canonical path.
    fn collect_artifacts(
        &self,
        extension_id: &str,
        folder: &Path,
    ) -> Result<Vec<PathBuf>, IsolationLoadError> {
        let entries = std::fs::read_dir(folder).map_err(|e| IsolationLoadError::ArtifactUnreadable {
            extension_id: extension_id.to_string(),
            path: folder.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.config.is_artifact(path))
            .collect();
        files.sort();

        let (primary, dependencies): (Vec<PathBuf>, Vec<PathBuf>) =
            files.into_iter().partition(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.contains(extension_id))
                    .unwrap_or(false)
            });

        let primary = match primary.len() {
            0 => {
                return Err(IsolationLoadError::PrimaryArtifactMissing {
                    extension_id: extension_id.to_string(),
                    folder: folder.display().to_string(),
                })
            }
            1 => primary.into_iter().next(),
            _ => {
                return Err(IsolationLoadError::PrimaryArtifactAmbiguous {
                    extension_id: extension_id.to_string(),
                    folder: folder.display().to_string(),
                    candidates: primary.iter().map(|p| p.display().to_string()).collect(),
                })
            }
        };

        let mut seen = HashSet::new();
        let mut artifacts = Vec::new();
        for path in primary.into_iter().chain(dependencies) {
            let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
            if seen.insert(canonical.clone()) {
                artifacts.push(canonical);
            } else {
                debug!(extension_id = %extension_id, path = %path.display(), "Duplicate artifact skipped");
            }
        }
        Ok(artifacts)
    }
}

/// SHA-256 of the primary artifact, hex encoded.
fn fingerprint(extension_id: &str, primary: &Path) -> Result<String, IsolationLoadError> {
    let bytes = std::fs::read(primary).map_err(|e| IsolationLoadError::ArtifactUnreadable {
        extension_id: extension_id.to_string(),
        path: primary.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn is_native_library(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("so") | Some("dylib") | Some("dll")
    )
}

/// Opens native artifacts and lets the primary register its factories.
fn load_native_artifacts(context: &IsolationContext) -> Result<(), IsolationLoadError> {
    let extension_id = context.extension_id().to_string();

    for (index, path) in context.artifacts().iter().enumerate() {
        if !is_native_library(path) {
            continue;
        }

        let load_failed = |reason: String| IsolationLoadError::LibraryLoadFailed {
            extension_id: extension_id.clone(),
            path: path.display().to_string(),
            reason,
        };

        // SAFETY: artifacts come from the operator-controlled extension roots;
        // running their initializers is the point of loading them.
        let library = unsafe { Library::new(path) }.map_err(|e| load_failed(e.to_string()))?;

        if index == 0 {
            // SAFETY: symbol signatures are fixed by `export_extensions!`.
            unsafe {
                match library.get::<AbiVersionFn>(ABI_VERSION_SYMBOL) {
                    Ok(abi_version) => {
                        let version = abi_version();
                        if version != EXTENSION_ABI_VERSION {
                            return Err(load_failed(format!(
                                "ABI version {} does not match host version {}",
                                version, EXTENSION_ABI_VERSION
                            )));
                        }
                    }
                    Err(_) => {
                        warn!(extension_id = %extension_id, path = %path.display(), "No ABI version symbol exported");
                    }
                }

                let register: Symbol<RegisterExtensionsFn> = library
                    .get(REGISTER_SYMBOL)
                    .map_err(|e| load_failed(e.to_string()))?;
                register(context.local_factories());
            }
            debug!(
                extension_id = %extension_id,
                factories = ?context.local_factories().entry_points(),
                "Native factories registered"
            );
        }

        context.retain_library(library);
    }

    Ok(())
}

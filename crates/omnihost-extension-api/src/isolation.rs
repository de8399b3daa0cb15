//! Per-extension isolation context.
//!
//! A context owns the artifacts resolved for one extension id, the factories
//! its native artifacts registered, and the library handles backing them. It
//! is chained to the host's factory table so entry points linked into the host
//! resolve through it as well.

use libloading::Library;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::factory::{ExtensionFactory, FactoryTable};

pub struct IsolationContext {
    extension_id: String,
    folder: PathBuf,
    /// Primary artifact first, then bundled dependencies
    artifacts: Vec<PathBuf>,
    fingerprint: Option<String>,
    /// Manifest version the context was built for
    source_version: Option<String>,
    // Field order matters: factories hold code from the libraries below and
    // must be dropped first.
    local: FactoryTable,
    parent: Arc<FactoryTable>,
    libraries: Mutex<Vec<Library>>,
}

impl IsolationContext {
    /// Creates a context over `artifacts`, the first of which is the primary.
    pub fn new(
        extension_id: impl Into<String>,
        folder: impl Into<PathBuf>,
        artifacts: Vec<PathBuf>,
        parent: Arc<FactoryTable>,
    ) -> Self {
        Self {
            extension_id: extension_id.into(),
            folder: folder.into(),
            artifacts,
            fingerprint: None,
            source_version: None,
            local: FactoryTable::new(),
            parent,
            libraries: Mutex::new(Vec::new()),
        }
    }

    /// Records the primary artifact's content hash.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Records the manifest version this context was loaded for.
    pub fn with_source_version(mut self, version: impl Into<String>) -> Self {
        self.source_version = Some(version.into());
        self
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn primary_artifact(&self) -> Option<&Path> {
        self.artifacts.first().map(|p| p.as_path())
    }

    pub fn dependency_artifacts(&self) -> &[PathBuf] {
        self.artifacts.get(1..).unwrap_or(&[])
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Version from the manifest, which may differ from what the instance
    /// reports (a synthetic placeholder always reports its own).
    pub fn source_version(&self) -> Option<&str> {
        self.source_version.as_deref()
    }

    /// Factories registered by this context's own artifacts.
    pub fn local_factories(&self) -> &FactoryTable {
        &self.local
    }

    /// Keeps a loaded library alive for the lifetime of the context.
    pub fn retain_library(&self, library: Library) {
        self.libraries.lock().push(library);
    }

    pub fn loaded_library_count(&self) -> usize {
        self.libraries.lock().len()
    }

    /// Resolves an entry point locally first, then through the host.
    pub fn resolve(&self, entry_point: &str) -> Option<Arc<ExtensionFactory>> {
        self.local
            .get(entry_point)
            .or_else(|| self.parent.get(entry_point))
    }
}

impl fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationContext")
            .field("extension_id", &self.extension_id)
            .field("folder", &self.folder)
            .field("artifacts", &self.artifacts)
            .field("fingerprint", &self.fingerprint)
            .field("local", &self.local)
            .field("libraries", &self.loaded_library_count())
            .finish()
    }
}

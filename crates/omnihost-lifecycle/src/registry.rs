//! Extension registry
//!
//! Thread-safe map of live extension records keyed by id, with the isolation
//! context each record was built through kept alongside it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use omnihost_core::error::LifecycleError;
use omnihost_extension_api::{Extension, IsolationContext};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry of loaded extensions.
///
/// Records are stored behind `Arc`, so callers can hold one across an
/// `await` without keeping a map shard locked.
#[derive(Default)]
pub struct ExtensionRegistry {
    records: DashMap<String, Arc<dyn Extension>>,
    contexts: DashMap<String, Arc<IsolationContext>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `record` under `id`, replacing whatever was there.
    pub fn register(&self, id: &str, record: Arc<dyn Extension>) -> Result<(), LifecycleError> {
        if id.trim().is_empty() {
            return Err(LifecycleError::InvalidRegistration {
                reason: "extension id cannot be empty".to_string(),
            });
        }

        // Both maps change while the record's shard is held; contexts are
        // only ever locked after records.
        let replaced = match self.records.entry(id.to_string()) {
            Entry::Occupied(mut occupied) => {
                self.store_context(id, record.as_ref());
                occupied.insert(record.clone());
                true
            }
            Entry::Vacant(vacant) => {
                self.store_context(id, record.as_ref());
                vacant.insert(record.clone());
                false
            }
        };
        if replaced {
            warn!(extension_id = %id, "Replaced registered extension");
        }

        info!(
            extension_id = %id,
            version = %record.version(),
            total = self.records.len(),
            "Extension registered"
        );
        Ok(())
    }

    /// Removes `id` together with its context, under the record's shard lock.
    pub fn unregister(&self, id: &str) -> Option<Arc<dyn Extension>> {
        let removed = match self.records.entry(id.to_string()) {
            Entry::Occupied(occupied) => {
                self.contexts.remove(id);
                Some(occupied.remove())
            }
            Entry::Vacant(_vacant) => {
                self.contexts.remove(id);
                None
            }
        };

        if removed.is_some() {
            info!(extension_id = %id, total = self.records.len(), "Extension unregistered");
        } else {
            debug!(extension_id = %id, "Unregister of unknown extension ignored");
        }
        removed
    }

    fn store_context(&self, id: &str, record: &dyn Extension) {
        match record.isolation_context() {
            Some(context) => {
                self.contexts.insert(id.to_string(), context);
            }
            None => {
                debug!(extension_id = %id, "Registered without an isolation context");
                self.contexts.remove(id);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Extension>> {
        self.records.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of all records.
    pub fn get_all(&self) -> Vec<Arc<dyn Extension>> {
        self.records
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn has(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn context(&self, id: &str) -> Option<Arc<IsolationContext>> {
        self.contexts.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub async fn start(&self, id: &str) -> Result<(), LifecycleError> {
        let record = self.get(id).ok_or_else(|| LifecycleError::not_found(id))?;
        record
            .start()
            .await
            .map_err(|e| LifecycleError::start_failed(id, format!("{:#}", e)))?;
        info!(extension_id = %id, "Extension started");
        Ok(())
    }

    pub async fn stop(&self, id: &str) -> Result<(), LifecycleError> {
        let record = self.get(id).ok_or_else(|| LifecycleError::not_found(id))?;
        record
            .stop()
            .await
            .map_err(|e| LifecycleError::stop_failed(id, format!("{:#}", e)))?;
        info!(extension_id = %id, "Extension stopped");
        Ok(())
    }

    /// Stops every registered extension concurrently. Failures are logged and
    /// returned; they do not cut the others short.
    pub async fn stop_all(&self) -> Vec<LifecycleError> {
        let ids = self.ids();
        info!(count = ids.len(), "Stopping all extensions");

        let results = join_all(ids.iter().map(|id| self.stop(id))).await;

        let failures: Vec<LifecycleError> = results.into_iter().filter_map(|r| r.err()).collect();
        for failure in &failures {
            warn!(error = %failure, "Extension failed to stop");
        }
        failures
    }
}
